use crate::registration::RegistrationState;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Illegal registration transition: {from} -> {to}")]
    IllegalTransition {
        from: RegistrationState,
        to: RegistrationState,
    },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}
