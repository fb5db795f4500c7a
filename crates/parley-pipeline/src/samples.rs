use bytes::Bytes;
use dashmap::DashMap;

use parley_core::ids::SampleId;

/// Synthesized speech samples, retrievable by id until removed.
pub struct SampleStore {
    samples: DashMap<SampleId, Bytes>,
    url_prefix: String,
}

impl SampleStore {
    /// `url_prefix` is the route samples are served from, e.g. `/samples`.
    pub fn new(url_prefix: impl Into<String>) -> Self {
        Self {
            samples: DashMap::new(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn insert(&self, audio: Bytes) -> SampleId {
        let id = SampleId::new();
        let _ = self.samples.insert(id.clone(), audio);
        id
    }

    pub fn get(&self, id: &SampleId) -> Option<Bytes> {
        self.samples.get(id).map(|s| s.value().clone())
    }

    pub fn remove(&self, id: &SampleId) -> Option<Bytes> {
        self.samples.remove(id).map(|(_, audio)| audio)
    }

    pub fn url_for(&self, id: &SampleId) -> String {
        format!("{}/{}", self.url_prefix, id)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new("/samples")
    }
}
