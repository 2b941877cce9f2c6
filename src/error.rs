use thiserror::Error;

/// Errors surfaced by the engine. The per-frame path never propagates these
/// across its boundary: a malformed bundle is dropped and counted, and
/// component degeneracies resolve to "no event". Definition loading is the
/// fatal path.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed landmark input: {0}")]
    MalformedInput(String),

    #[error("invalid definition: {0}")]
    Definition(String),

    #[error("definition parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
