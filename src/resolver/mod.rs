use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;

use crate::db::UpsertStore;
use crate::error::RecordError;
use crate::models::{NewLeague, NewTeam, SourceRef, UpsertOutcome};
use crate::utils::{normalize_name, normalize_sport, validate_entity_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EntityKind {
    League,
    Team,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::League => f.write_str("league"),
            EntityKind::Team => f.write_str("team"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: EntityKind,
    name_key: String,
    sport: String,
    country: Option<String>,
    source_ref: Option<SourceRef>,
}

/// Result of a resolution. `outcome` is `None` when the id came from the
/// cache or a source-id lookup and nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub id: String,
    pub outcome: Option<UpsertOutcome>,
}

impl Resolved {
    /// Outcome for counting; a cached re-sighting counts as an update.
    pub fn outcome(&self) -> UpsertOutcome {
        self.outcome.clone().unwrap_or_else(|| UpsertOutcome::Updated(self.id.clone()))
    }
}

/// Maps vendor names and ids for leagues and teams onto stable internal ids.
///
/// Matching is exact on the normalized (name, sport) pair. Spelling variants
/// such as "Man United" and "Manchester United" stay separate entities.
pub struct IdentityResolver {
    store: UpsertStore,
    cache: Mutex<HashMap<CacheKey, String>>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl IdentityResolver {
    pub fn new(store: UpsertStore) -> Self {
        Self { store, cache: Mutex::new(HashMap::new()) }
    }

    /// Forget cached ids, e.g. between runs, in case rows were removed by hand.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn resolve_league(
        &self,
        name: Option<&str>,
        sport: Option<&str>,
        country: Option<&str>,
        source: &str,
        source_id: Option<&str>,
    ) -> Result<Resolved, RecordError> {
        self.resolve(EntityKind::League, name, sport, country, source, source_id).await
    }

    pub async fn resolve_team(
        &self,
        name: Option<&str>,
        sport: Option<&str>,
        country: Option<&str>,
        source: &str,
        source_id: Option<&str>,
    ) -> Result<Resolved, RecordError> {
        self.resolve(EntityKind::Team, name, sport, country, source, source_id).await
    }

    async fn resolve(
        &self,
        kind: EntityKind,
        name: Option<&str>,
        sport: Option<&str>,
        country: Option<&str>,
        source: &str,
        source_id: Option<&str>,
    ) -> Result<Resolved, RecordError> {
        let source_ref = present(source_id).map(|id| SourceRef::new(source, id));
        let country = present(country);

        let (Some(name), Some(sport)) = (present(name), present(sport)) else {
            // Without a name the vendor id is the only handle left.
            if let Some(source_ref) = &source_ref {
                let known = match kind {
                    EntityKind::League => self.store.find_league_by_source(&source_ref.source, &source_ref.id).await?,
                    EntityKind::Team => self.store.find_team_by_source(&source_ref.source, &source_ref.id).await?,
                };
                if let Some(id) = known {
                    return Ok(Resolved { id, outcome: None });
                }
            }
            return Err(RecordError::malformed(format!("{} is missing name or sport", kind)));
        };
        if !validate_entity_name(name) {
            return Err(RecordError::malformed(format!("{} name is unusable: {:?}", kind, name)));
        }

        let key = CacheKey {
            kind,
            name_key: normalize_name(name),
            sport: normalize_sport(sport),
            country: country.map(normalize_name),
            source_ref: source_ref.clone(),
        };
        if let Some(id) = self.cache.lock().await.get(&key) {
            return Ok(Resolved { id: id.clone(), outcome: None });
        }

        let outcome = match kind {
            EntityKind::League => {
                self.store
                    .upsert_league(&NewLeague {
                        name: name.to_string(),
                        sport: sport.to_string(),
                        country: country.map(str::to_string),
                        source_ref,
                    })
                    .await?
            }
            EntityKind::Team => {
                self.store
                    .upsert_team(&NewTeam {
                        name: name.to_string(),
                        sport: sport.to_string(),
                        country: country.map(str::to_string),
                        source_ref,
                    })
                    .await?
            }
        };
        if outcome.is_insert() {
            tracing::debug!("new {} {:?} ({})", kind, name, outcome.id());
        }

        let id = outcome.id().to_string();
        self.cache.lock().await.insert(key, id.clone());
        Ok(Resolved { id, outcome: Some(outcome) })
    }
}
