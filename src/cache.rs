//! TTL-keyed response cache for previously fetched metadata.
//!
//! Entities are bucketed by kind: single mods, listing pages (keyed by game
//! plus filter signature), dependency lists, and tag vocabularies. Expired
//! entries behave as absent and are evicted lazily at lookup time; mutations
//! invalidate explicitly so the next read is forced to the network.

use crate::id::{GameId, ModId};
use crate::types::{ModDependency, ModInfo, ModInfoList, TagOption};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    value: T,
    inserted: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        CacheEntry {
            value,
            inserted: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.inserted.elapsed() >= self.ttl
    }
}

#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    mods: HashMap<ModId, CacheEntry<ModInfo>>,
    mod_lists: HashMap<(GameId, String), CacheEntry<ModInfoList>>,
    dependencies: HashMap<ModId, CacheEntry<Vec<ModDependency>>>,
    tags: HashMap<GameId, CacheEntry<Vec<TagOption>>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        ResponseCache {
            ttl,
            mods: HashMap::new(),
            mod_lists: HashMap::new(),
            dependencies: HashMap::new(),
            tags: HashMap::new(),
        }
    }

    pub fn add_mod(&mut self, info: ModInfo) {
        self.mods.insert(info.id, CacheEntry::new(info, self.ttl));
    }

    pub fn fetch_mod(&mut self, id: ModId) -> Option<ModInfo> {
        Self::lookup(&mut self.mods, &id)
    }

    pub fn add_mod_list(&mut self, game: GameId, signature: String, list: ModInfoList) {
        // Listing results also carry full mod snapshots worth keeping.
        for info in &list.data {
            self.mods
                .insert(info.id, CacheEntry::new(info.clone(), self.ttl));
        }
        self.mod_lists
            .insert((game, signature), CacheEntry::new(list, self.ttl));
    }

    pub fn fetch_mod_list(&mut self, game: GameId, signature: &str) -> Option<ModInfoList> {
        Self::lookup(&mut self.mod_lists, &(game, signature.to_string()))
    }

    pub fn add_dependencies(&mut self, id: ModId, deps: Vec<ModDependency>) {
        self.dependencies.insert(id, CacheEntry::new(deps, self.ttl));
    }

    pub fn fetch_dependencies(&mut self, id: ModId) -> Option<Vec<ModDependency>> {
        Self::lookup(&mut self.dependencies, &id)
    }

    pub fn add_tags(&mut self, game: GameId, tags: Vec<TagOption>) {
        self.tags.insert(game, CacheEntry::new(tags, self.ttl));
    }

    pub fn fetch_tags(&mut self, game: GameId) -> Option<Vec<TagOption>> {
        Self::lookup(&mut self.tags, &game)
    }

    /// Drop everything that could be stale after a mutation of `id`: the mod
    /// snapshot, its dependency list, and every listing bucket (a mutated mod
    /// may move between pages or filters).
    pub fn invalidate_mod(&mut self, id: ModId) {
        self.mods.remove(&id);
        self.dependencies.remove(&id);
        self.mod_lists.clear();
    }

    /// Drop everything belonging to one game.
    pub fn invalidate_game(&mut self, game: GameId) {
        self.mods.retain(|_, entry| entry.value.game_id != game);
        self.mod_lists.retain(|(g, _), _| *g != game);
        self.tags.remove(&game);
        // Dependency lists are not game-tagged; drop them all.
        self.dependencies.clear();
    }

    pub fn clear(&mut self) {
        self.mods.clear();
        self.mod_lists.clear();
        self.dependencies.clear();
        self.tags.clear();
    }

    fn lookup<K, V>(map: &mut HashMap<K, CacheEntry<V>>, key: &K) -> Option<V>
    where
        K: std::hash::Hash + Eq + Clone,
        V: Clone,
    {
        match map.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }
}
