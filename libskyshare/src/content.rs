//! Content source: where published items are loaded from

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::types::Content;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Load a content item; `None` when it does not exist
    async fn get_content(&self, id: &str) -> Result<Option<Content>>;

    /// Insert or replace a content item
    async fn put_content(&self, content: &Content) -> Result<()>;
}

/// In-memory content source
#[derive(Debug, Default)]
pub struct MemoryContent {
    items: Mutex<HashMap<String, Content>>,
}

impl MemoryContent {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentSource for MemoryContent {
    async fn get_content(&self, id: &str) -> Result<Option<Content>> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        Ok(items.get(id).cloned())
    }

    async fn put_content(&self, content: &Content) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.insert(content.id.clone(), content.clone());
        Ok(())
    }
}
