//! Medical conditions for the primary demo patient. Natural key is the
//! (user, condition name) pair, so the same diagnosis is never duplicated
//! for one person.

use async_trait::async_trait;
use tracing::debug;

use crate::core::quote_literal;
use crate::db::DbHandle;
use crate::error::{MigrateError, Result};
use crate::seed::users::PRIMARY_PATIENT;
use crate::seed::{select_id, IdentityMap, SeedLoader, SeedResult};

pub(crate) struct ConditionSeed {
    pub name: &'static str,
    pub icd_code: &'static str,
    pub status: &'static str,
    pub severity: &'static str,
}

pub(crate) const DEMO_CONDITIONS: &[ConditionSeed] = &[
    ConditionSeed {
        name: "Type 2 Diabetes",
        icd_code: "E11.9",
        status: "managed",
        severity: "moderate",
    },
    ConditionSeed {
        name: "Hypertension",
        icd_code: "I10",
        status: "managed",
        severity: "mild",
    },
    ConditionSeed {
        name: "Vitamin D Deficiency",
        icd_code: "E55.9",
        status: "active",
        severity: "mild",
    },
    ConditionSeed {
        name: "Allergic Rhinitis",
        icd_code: "J30.9",
        status: "active",
        severity: "mild",
    },
];

pub(crate) struct ConditionLoader;

#[async_trait]
impl SeedLoader for ConditionLoader {
    fn category(&self) -> &'static str {
        "conditions"
    }

    fn requires_identities(&self) -> bool {
        true
    }

    async fn load(
        &self,
        db: &dyn DbHandle,
        identities: &IdentityMap,
        skip_existing: bool,
    ) -> Result<SeedResult> {
        let user_id = *identities.get(PRIMARY_PATIENT).ok_or_else(|| {
            MigrateError::seed(
                self.category(),
                format!("user {PRIMARY_PATIENT} is not in the identity map; load users first"),
            )
        })?;
        let mut result = SeedResult::new(self.category());
        for condition in DEMO_CONDITIONS {
            let lookup = format!(
                "SELECT id FROM conditions WHERE user_id = {user_id} AND name = {}",
                quote_literal(condition.name)
            );
            if skip_existing {
                if let Some(id) = select_id(db, &lookup, self.category()).await? {
                    debug!(name = condition.name, id, "condition already present");
                    result.skipped += 1;
                    continue;
                }
            }
            let insert = format!(
                "INSERT INTO conditions (user_id, name, icd_code, status, severity) \
                 VALUES ({user_id}, {}, {}, {}, {})",
                quote_literal(condition.name),
                quote_literal(condition.icd_code),
                quote_literal(condition.status),
                quote_literal(condition.severity)
            );
            db.execute(&insert).await?;
            result.loaded += 1;
        }
        Ok(result)
    }
}
