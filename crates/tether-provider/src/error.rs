use thiserror::Error;

use crate::command::CommandId;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("client error: {0}")]
    Client(#[from] tether_client::ClientError),

    #[error("command {0} was dropped before it finished")]
    Dropped(CommandId),
}

pub type ProviderResult<T> = Result<T, ProviderError>;
