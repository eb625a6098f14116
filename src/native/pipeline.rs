//! Pipeline state objects.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

/// A compiled pipeline state object.
#[derive(Debug)]
pub struct NativePipeline {
    id: u64,
    kind: PipelineKind,
    state_hash: u64,
}

impl NativePipeline {
    pub(super) fn new(id: u64, kind: PipelineKind, state_hash: u64) -> Self {
        Self {
            id,
            kind,
            state_hash,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Hash of the shader bytecode and fixed-function state this object was built from.
    #[inline]
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.state_hash
    }
}
