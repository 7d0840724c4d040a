// error.rs — load-time and geometry error types

use thiserror::Error;

/// Errors raised while turning a map file into a level.
#[derive(Debug, Error)]
pub enum AssetError {
    /// A lump or sub-header failed its bounds or size checks.
    #[error("malformed {lump} lump: {reason}")]
    Malformed { lump: &'static str, reason: String },

    /// The file as a whole cannot be used: bad compression, a failed
    /// parse, or records that point outside their tables.
    #[error("corrupt map {name}: {reason}")]
    Corrupt { name: String, reason: String },

    #[error("i/o error reading {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl AssetError {
    pub fn malformed(lump: &'static str, reason: impl Into<String>) -> Self {
        AssetError::Malformed { lump, reason: reason.into() }
    }

    pub fn corrupt(name: impl Into<String>, reason: impl Into<String>) -> Self {
        AssetError::Corrupt { name: name.into(), reason: reason.into() }
    }
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Errors from the plane-intersection solver.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeometryError {
    /// The three planes do not meet in a single point.
    #[error("degenerate plane triple (determinant {determinant})")]
    Degenerate { determinant: f32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let e = AssetError::malformed("faces", "length 10 is not a multiple of 104");
        assert_eq!(e.to_string(), "malformed faces lump: length 10 is not a multiple of 104");

        let e = AssetError::corrupt("maps/dm1.bsp", "bad gzip stream");
        assert_eq!(e.to_string(), "corrupt map maps/dm1.bsp: bad gzip stream");
    }
}
