use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchingError>;

#[derive(Error, Debug)]
pub enum MatchingError {
    #[error("Embedding store error: {0}")]
    Store(#[from] pantry_embedding_store::EmbeddingStoreError),

    #[error("Offer directory error: {0}")]
    Directory(String),
}
