use thiserror::Error;

// Every failure the engine reports before a generation pass starts.
// Numeric trouble inside a pass (NaN, zero sums) is clamped, never raised.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Invalid or missing parameters, mismatched list lengths, dangling references
    #[error("configuration error in {context}: {message}")]
    Configuration { context: String, message: String },

    // Missing or malformed raster input
    #[error("failed to load asset `{asset}`: {message}")]
    AssetLoad { asset: String, message: String },

    // Degenerate paths, zero-sized tiles or rectangles
    #[error("geometry error in {context}: {message}")]
    Geometry { context: String, message: String },
}

impl Error {
    pub fn config(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Configuration {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn asset(asset: impl Into<String>, message: impl Into<String>) -> Self {
        Error::AssetLoad {
            asset: asset.into(),
            message: message.into(),
        }
    }

    pub fn geometry(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Geometry {
            context: context.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn messages_name_the_failing_part() {
        let e = Error::config("layer[2] 'ridges'", "octaves must be at least 1");
        assert_eq!(
            e.to_string(),
            "configuration error in layer[2] 'ridges': octaves must be at least 1"
        );
        let e = Error::asset("stencils/lake.png", "file not found");
        assert!(e.to_string().contains("stencils/lake.png"));
    }
}
