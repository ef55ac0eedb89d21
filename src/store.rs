//! Tea profile store.
//!
//! The brew only needs a [`Recipe`]; where recipes live is up to the
//! application. [`ProfileStore`] is the seam, and [`InMemoryProfileStore`]
//! is a simple implementation for tests and demos.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::brew::Recipe;
use crate::context::SessionContext;
use crate::error::{Error, Result};

/// Owner id of the built-in teas every user can see.
pub const ADMIN_OWNER: &str = "ADMIN";

/// A stored tea.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TeaProfile {
    /// Store-assigned id.
    pub tea_id: String,
    /// User id of the owner, or [`ADMIN_OWNER`].
    pub owner: String,
    /// Marked as a favorite by its owner.
    pub favorite: bool,
    /// Brewing parameters.
    pub recipe: Recipe,
}

impl TeaProfile {
    /// Check if this is a built-in tea.
    pub fn is_builtin(&self) -> bool {
        self.owner == ADMIN_OWNER
    }

    /// Check if `ctx` may see this tea.
    pub fn is_visible_to(&self, ctx: &SessionContext) -> bool {
        self.is_builtin() || ctx.user_id() == Some(self.owner.as_str())
    }
}

/// Async access to stored teas.
///
/// Every call completes exactly once with either a value or an error.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Look up a tea by id.
    async fn get_tea(&self, tea_id: &str) -> Result<Option<TeaProfile>>;

    /// Teas visible to `ctx`: built-in teas plus the user's own.
    async fn teas_for(&self, ctx: &SessionContext) -> Result<Vec<TeaProfile>>;

    /// Insert or replace a tea.
    async fn put_tea(&self, profile: TeaProfile) -> Result<()>;

    /// Delete a tea. Returns whether it existed.
    async fn delete_tea(&self, tea_id: &str) -> Result<bool>;

    /// The recipe of a tea, if it exists.
    async fn recipe(&self, tea_id: &str) -> Result<Option<Recipe>> {
        Ok(self.get_tea(tea_id).await?.map(|p| p.recipe))
    }
}

/// [`ProfileStore`] kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    teas: RwLock<Vec<TeaProfile>>,
}

impl InMemoryProfileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `teas`.
    pub fn with_teas(teas: impl IntoIterator<Item = TeaProfile>) -> Self {
        Self {
            teas: RwLock::new(teas.into_iter().collect()),
        }
    }

    /// Number of stored teas.
    pub fn len(&self) -> usize {
        self.teas.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.teas.read().is_empty()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_tea(&self, tea_id: &str) -> Result<Option<TeaProfile>> {
        Ok(self.teas.read().iter().find(|t| t.tea_id == tea_id).cloned())
    }

    async fn teas_for(&self, ctx: &SessionContext) -> Result<Vec<TeaProfile>> {
        Ok(self
            .teas
            .read()
            .iter()
            .filter(|t| t.is_visible_to(ctx))
            .cloned()
            .collect())
    }

    async fn put_tea(&self, profile: TeaProfile) -> Result<()> {
        if profile.tea_id.trim().is_empty() {
            return Err(Error::invalid_parameter("tea_id", profile.tea_id));
        }

        let mut teas = self.teas.write();
        match teas.iter_mut().find(|t| t.tea_id == profile.tea_id) {
            Some(existing) => *existing = profile,
            None => teas.push(profile),
        }
        Ok(())
    }

    async fn delete_tea(&self, tea_id: &str) -> Result<bool> {
        let mut teas = self.teas.write();
        let before = teas.len();
        teas.retain(|t| t.tea_id != tea_id);
        Ok(teas.len() != before)
    }
}
