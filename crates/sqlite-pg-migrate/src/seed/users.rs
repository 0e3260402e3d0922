//! Demo user accounts. This is the identity category: the id map it
//! returns keys every other loader's foreign keys.

use async_trait::async_trait;
use tracing::debug;

use crate::core::quote_literal;
use crate::db::DbHandle;
use crate::error::{MigrateError, Result};
use crate::seed::{select_id, text_or_null, IdentityMap, SeedLoader, SeedResult};

/// External id of the primary demo patient, the one who carries the full
/// record set (conditions, repeat appointments).
pub(crate) const PRIMARY_PATIENT: &str = "P001";

pub(crate) struct UserSeed {
    pub external_id: &'static str,
    pub name: &'static str,
    pub email: Option<&'static str>,
    pub phone: Option<&'static str>,
    pub role: &'static str,
}

pub(crate) const DEMO_USERS: &[UserSeed] = &[
    UserSeed {
        external_id: "P001",
        name: "Sarah Chen",
        email: Some("sarah.chen@example.com"),
        phone: Some("+15550001111"),
        role: "patient",
    },
    UserSeed {
        external_id: "ADMIN001",
        name: "Dr. Admin",
        email: Some("admin@longevityclinic.com"),
        phone: None,
        role: "admin",
    },
    // Same person as P001, holding a second account with elevated access.
    UserSeed {
        external_id: "P001-ADMIN",
        name: "Sarah Chen",
        email: Some("sarah.chen+admin@example.com"),
        phone: Some("+15550001111"),
        role: "admin",
    },
    UserSeed {
        external_id: "P002",
        name: "Marcus Williams",
        email: Some("marcus.w@example.com"),
        phone: Some("+15551234567"),
        role: "patient",
    },
    UserSeed {
        external_id: "P003",
        name: "Elena Rodriguez",
        email: Some("elena.r@example.com"),
        phone: Some("+15559876543"),
        role: "patient",
    },
    UserSeed {
        external_id: "P004",
        name: "James Miller",
        email: Some("james.m@example.com"),
        phone: Some("+15554567890"),
        role: "patient",
    },
    UserSeed {
        external_id: "P005",
        name: "Emily Wong",
        email: Some("emily.w@example.com"),
        phone: Some("+15552223333"),
        role: "patient",
    },
];

pub(crate) struct UserLoader;

#[async_trait]
impl SeedLoader for UserLoader {
    fn category(&self) -> &'static str {
        "users"
    }

    async fn load(
        &self,
        db: &dyn DbHandle,
        _identities: &IdentityMap,
        skip_existing: bool,
    ) -> Result<SeedResult> {
        let mut result = SeedResult::new(self.category());
        for user in DEMO_USERS {
            let lookup = format!(
                "SELECT id FROM users WHERE external_id = {}",
                quote_literal(user.external_id)
            );
            if skip_existing {
                if let Some(id) = select_id(db, &lookup, self.category()).await? {
                    debug!(external_id = user.external_id, id, "user already present");
                    result.id_map.insert(user.external_id.to_string(), id);
                    result.skipped += 1;
                    continue;
                }
            }
            let insert = format!(
                "INSERT INTO users (external_id, name, email, phone, role) \
                 VALUES ({}, {}, {}, {}, {})",
                quote_literal(user.external_id),
                quote_literal(user.name),
                text_or_null(user.email),
                text_or_null(user.phone),
                quote_literal(user.role)
            );
            db.execute(&insert).await?;
            let id = select_id(db, &lookup, self.category()).await?.ok_or_else(|| {
                MigrateError::seed(
                    self.category(),
                    format!("user {} not found after insert", user.external_id),
                )
            })?;
            result.id_map.insert(user.external_id.to_string(), id);
            result.loaded += 1;
        }
        Ok(result)
    }
}
