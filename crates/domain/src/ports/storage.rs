use crate::DomainResult;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub object_key: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: usize,
}

pub trait ObjectStorage: Send + Sync {
    /// Stores the object and returns its public URL.
    fn upload(
        &self,
        bytes: &[u8],
        metadata: &ObjectMetadata,
    ) -> crate::ports::BoxFuture<'_, DomainResult<String>>;
}
