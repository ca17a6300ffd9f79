//! Error type shared by the path, program and compiler modules.

pub type KrlResult<T> = Result<T, KrlError>;

#[derive(thiserror::Error, Debug)]
pub enum KrlError {
    #[error("input error: {0}")]
    Input(String),

    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl KrlError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn unsupported_value(msg: impl Into<String>) -> Self {
        Self::UnsupportedValue(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(KrlError::input("x").to_string().contains("input error:"));
        assert!(
            KrlError::unsupported_value("x")
                .to_string()
                .contains("unsupported value:")
        );
        assert!(
            KrlError::config("x")
                .to_string()
                .contains("configuration error:")
        );
    }

    #[test]
    fn collaborator_preserves_source() {
        let err = KrlError::from(anyhow::anyhow!("scene export failed"));
        assert!(err.to_string().contains("scene export failed"));
    }
}
