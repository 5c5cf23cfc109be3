//! Registry of boolean facts that can be asserted about documents

use parking_lot::RwLock;

use crate::error::{Result, SluiceError};

use super::types::FactHandle;

/// Registered facts. Each handle maps to one bit of a row's fact bitset.
#[derive(Debug, Default)]
pub struct FactSet {
    names: RwLock<Vec<String>>,
}

impl FactSet {
    /// Facts per index; a row stores its facts in a `u64`
    pub const MAX_FACTS: usize = 64;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_fact(&self, name: &str) -> Result<FactHandle> {
        let mut names = self.names.write();
        if names.len() >= Self::MAX_FACTS {
            return Err(SluiceError::TooManyFacts {
                limit: Self::MAX_FACTS,
            });
        }
        let handle = FactHandle(names.len() as u8);
        names.push(name.to_string());
        Ok(handle)
    }

    pub fn contains(&self, fact: FactHandle) -> bool {
        fact.as_usize() < self.names.read().len()
    }

    pub fn name(&self, fact: FactHandle) -> Option<String> {
        self.names.read().get(fact.as_usize()).cloned()
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}
