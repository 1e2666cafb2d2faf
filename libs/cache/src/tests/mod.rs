use std::cell::Cell;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::{mem::NamespaceCache, CacheState, Cacheable, CacheableWithState};

pub(crate) mod mem;

#[derive(Serialize, Deserialize, Debug, Clone, Hash, Eq, PartialEq)]
pub struct Key(u64);

impl Cacheable for Key {
    const NAMESPACE: &'static str = "tests.key";
    type Output = u64;
    type Error = anyhow::Error;

    fn generate(&self) -> Result<Self::Output, Self::Error> {
        if self.0 == 5 {
            bail!("invalid key");
        }
        Ok(self.0)
    }
}

/// State that counts how many times a generator has run.
#[derive(Default)]
pub struct Counter {
    pub cache: NamespaceCache,
    pub runs: Cell<u64>,
}

impl CacheState for Counter {
    fn cache(&mut self) -> &mut NamespaceCache {
        &mut self.cache
    }
}

impl CacheableWithState<Counter> for Key {
    const NAMESPACE: &'static str = "tests.key_with_state";
    type Output = u64;
    type Error = anyhow::Error;

    fn generate_with_state(&self, state: &mut Counter) -> Result<Self::Output, Self::Error> {
        state.runs.set(state.runs.get() + 1);
        self.generate()
    }
}
