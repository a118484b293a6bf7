//! Authoritative registry of validated templates

use crate::cache::TemplateCache;
use crate::parser;
use redprobe_core::{Error, Result, Template};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;

#[derive(Default)]
struct RegistryInner {
    templates: HashMap<String, Arc<Template>>,
    by_tag: HashMap<String, HashSet<String>>,
    by_category: HashMap<String, HashSet<String>>,
}

impl RegistryInner {
    fn index(&mut self, template: &Template) {
        for tag in &template.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(template.id.clone());
        }
        if !template.category.is_empty() {
            self.by_category
                .entry(template.category.clone())
                .or_default()
                .insert(template.id.clone());
        }
    }

    fn unindex(&mut self, template: &Template) {
        for tag in &template.tags {
            if let Some(ids) = self.by_tag.get_mut(tag) {
                ids.remove(&template.id);
                if ids.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        if let Some(ids) = self.by_category.get_mut(&template.category) {
            ids.remove(&template.id);
            if ids.is_empty() {
                self.by_category.remove(&template.category);
            }
        }
    }
}

/// The registry exclusively owns validated templates; the cache only holds
/// weak references to them. All mutations go through one writer lock, so an
/// observer sees each registration fully or not at all.
pub struct TemplateRegistry {
    inner: RwLock<RegistryInner>,
    cache: Option<Arc<TemplateCache>>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            cache: None,
        }
    }

    /// Wire a cache so unregister/update invalidate its entries.
    pub fn with_cache(cache: Arc<TemplateCache>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            cache: Some(cache),
        }
    }

    /// Validate and insert. Duplicate ids are rejected.
    pub fn register(&self, template: Template) -> Result<Arc<Template>> {
        parser::validate(&template)?;
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.templates.contains_key(&template.id) {
            return Err(Error::DuplicateId(template.id));
        }
        let arc = Arc::new(template);
        inner.index(&arc);
        inner.templates.insert(arc.id.clone(), arc.clone());
        debug!(template = %arc.id, "registered template");
        Ok(arc)
    }

    /// Remove a template and invalidate its cache entry.
    pub fn unregister(&self, id: &str) -> Result<()> {
        let removed = {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            let template = inner
                .templates
                .remove(id)
                .ok_or_else(|| Error::TemplateNotFound(id.to_string()))?;
            inner.unindex(&template);
            template
        };
        if let Some(cache) = &self.cache {
            cache.delete(id);
        }
        debug!(template = %removed.id, "unregistered template");
        Ok(())
    }

    /// Replace an existing template in place (same id).
    pub fn update(&self, template: Template) -> Result<Arc<Template>> {
        parser::validate(&template)?;
        let arc = {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            let previous = inner
                .templates
                .remove(&template.id)
                .ok_or_else(|| Error::TemplateNotFound(template.id.clone()))?;
            inner.unindex(&previous);
            let arc = Arc::new(template);
            inner.index(&arc);
            inner.templates.insert(arc.id.clone(), arc.clone());
            arc
        };
        if let Some(cache) = &self.cache {
            cache.delete(&arc.id);
        }
        Ok(arc)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Template>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .templates
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .templates
            .contains_key(id)
    }

    pub fn list(&self) -> Vec<Arc<Template>> {
        let mut all: Vec<Arc<Template>> = self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .templates
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<Arc<Template>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<Arc<Template>> = inner
            .by_tag
            .get(tag)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.templates.get(id).cloned())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    /// Templates carrying every one of `tags`.
    pub fn find_by_tags(&self, tags: &[&str]) -> Vec<Arc<Template>> {
        if tags.is_empty() {
            return Vec::new();
        }
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Option<HashSet<String>> = None;
        for tag in tags {
            let tagged = match inner.by_tag.get(*tag) {
                Some(set) => set.clone(),
                None => return Vec::new(),
            };
            ids = Some(match ids {
                Some(acc) => acc.intersection(&tagged).cloned().collect(),
                None => tagged,
            });
        }
        let mut found: Vec<Arc<Template>> = ids
            .unwrap_or_default()
            .iter()
            .filter_map(|id| inner.templates.get(id).cloned())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    pub fn find_by_category(&self, category: &str) -> Vec<Arc<Template>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<Arc<Template>> = inner
            .by_category
            .get(category)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.templates.get(id).cloned())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    pub fn count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .templates
            .len()
    }
}
