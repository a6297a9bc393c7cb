use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Random-access collection of items.
pub trait Dataset<I>: Send + Sync {
    fn get(&self, index: usize) -> Option<I>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<I: Clone + Send + Sync> Dataset<I> for Vec<I> {
    fn get(&self, index: usize) -> Option<I> {
        self.as_slice().get(index).cloned()
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// The role a dataset was registered under; decides its loader settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetRole {
    General,
    Train,
    Eval,
}

impl DatasetRole {
    pub fn shuffle(self) -> bool {
        !matches!(self, DatasetRole::Eval)
    }

    /// Partial final batches are dropped only for shuffled roles on an
    /// accelerator.
    pub fn drop_last(self, accelerated: bool) -> bool {
        accelerated && self.shuffle()
    }
}

/// Splits a dataset into batches of owned items, reshuffling every pass.
pub struct BatchLoader<I> {
    dataset: Arc<dyn Dataset<I>>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: u64,
    rng: StdRng,
}

impl<I> BatchLoader<I> {
    pub fn new(
        dataset: Arc<dyn Dataset<I>>,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
        seed: u64,
    ) -> Self {
        BatchLoader {
            dataset,
            batch_size: batch_size.max(1),
            shuffle,
            drop_last,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Rewind the shuffle sequence to its initial seed.
    pub fn reseed(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    pub fn drops_last(&self) -> bool {
        self.drop_last
    }

    /// Number of batches one pass yields.
    pub fn len(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a pass over the dataset. The returned iterator owns its order
    /// and does not borrow the loader.
    pub fn iter(&mut self) -> Batches<I> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        Batches {
            dataset: Arc::clone(&self.dataset),
            order,
            batch_size: self.batch_size,
            drop_last: self.drop_last,
            cursor: 0,
        }
    }
}

pub struct Batches<I> {
    dataset: Arc<dyn Dataset<I>>,
    order: Vec<usize>,
    batch_size: usize,
    drop_last: bool,
    cursor: usize,
}

impl<I> Iterator for Batches<I> {
    type Item = Vec<I>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.order.len() - self.cursor;
        if remaining == 0 || (self.drop_last && remaining < self.batch_size) {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.order[self.cursor..end]
            .iter()
            .filter_map(|&i| self.dataset.get(i))
            .collect();
        self.cursor = end;
        Some(batch)
    }
}

/// Datasets by role plus the loaders derived from them.
pub(crate) struct DataRegistry<I> {
    sets: [BTreeMap<String, Arc<dyn Dataset<I>>>; 3],
    loaders: BTreeMap<String, BatchLoader<I>>,
}

impl<I> DataRegistry<I> {
    pub(crate) fn new() -> Self {
        DataRegistry {
            sets: [BTreeMap::new(), BTreeMap::new(), BTreeMap::new()],
            loaders: BTreeMap::new(),
        }
    }

    fn slot(role: DatasetRole) -> usize {
        match role {
            DatasetRole::General => 0,
            DatasetRole::Train => 1,
            DatasetRole::Eval => 2,
        }
    }

    pub(crate) fn insert(&mut self, role: DatasetRole, name: String, dataset: Arc<dyn Dataset<I>>) {
        self.sets[Self::slot(role)].insert(name, dataset);
    }

    pub(crate) fn dataset(&self, name: &str) -> Option<&Arc<dyn Dataset<I>>> {
        self.sets.iter().rev().find_map(|sets| sets.get(name))
    }

    /// Rebuild every loader. A name registered under several roles ends up
    /// with the settings of the last role (general, train, eval).
    pub(crate) fn prepare(&mut self, batch_size: usize, accelerated: bool, seed: u64) {
        self.loaders.clear();
        let roles = [DatasetRole::General, DatasetRole::Train, DatasetRole::Eval];
        let mut index = 0u64;
        for role in roles {
            for (name, dataset) in &self.sets[Self::slot(role)] {
                let loader = BatchLoader::new(
                    Arc::clone(dataset),
                    batch_size,
                    role.shuffle(),
                    role.drop_last(accelerated),
                    seed.wrapping_add(index),
                );
                self.loaders.insert(name.clone(), loader);
                index += 1;
            }
        }
    }

    pub(crate) fn reseed(&mut self) {
        self.loaders.values_mut().for_each(BatchLoader::reseed);
    }

    pub(crate) fn loader_mut(&mut self, name: &str) -> Option<&mut BatchLoader<I>> {
        self.loaders.get_mut(name)
    }

    pub(crate) fn loader_names(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }
}
