//! Treatment catalog. Independent of every other category; keyed by the
//! clinic's own treatment code.

use async_trait::async_trait;
use tracing::debug;

use crate::core::quote_literal;
use crate::db::DbHandle;
use crate::error::{MigrateError, Result};
use crate::seed::{select_id, IdentityMap, SeedLoader, SeedResult};

pub(crate) struct TreatmentSeed {
    pub code: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    /// Rendered as a bare numeric literal.
    pub cost: &'static str,
}

pub(crate) const DEMO_TREATMENTS: &[TreatmentSeed] = &[
    TreatmentSeed {
        code: "T001",
        name: "Vitamin C IV Mega-Dose",
        category: "IV Therapy",
        cost: "150.00",
    },
    TreatmentSeed {
        code: "T002",
        name: "Whole Body Cryotherapy",
        category: "Cryotherapy",
        cost: "45.00",
    },
    TreatmentSeed {
        code: "T003",
        name: "NAD+ Optimization",
        category: "Supplements",
        cost: "120.00",
    },
    TreatmentSeed {
        code: "T004",
        name: "Testosterone Replacement",
        category: "Hormone Therapy",
        cost: "200.00",
    },
    TreatmentSeed {
        code: "T005",
        name: "Deep Tissue Massage",
        category: "Spa Services",
        cost: "90.00",
    },
    TreatmentSeed {
        code: "T006",
        name: "Hyperbaric Oxygen Therapy (HBOT)",
        category: "Oxygen Therapy",
        cost: "250.00",
    },
    TreatmentSeed {
        code: "T007",
        name: "Ozone Therapy",
        category: "IV Therapy",
        cost: "175.00",
    },
    TreatmentSeed {
        code: "T008",
        name: "Magnesium Glycinate Protocol",
        category: "Supplements",
        cost: "35.00",
    },
];

pub(crate) struct TreatmentLoader;

#[async_trait]
impl SeedLoader for TreatmentLoader {
    fn category(&self) -> &'static str {
        "treatments"
    }

    async fn load(
        &self,
        db: &dyn DbHandle,
        _identities: &IdentityMap,
        skip_existing: bool,
    ) -> Result<SeedResult> {
        let mut result = SeedResult::new(self.category());
        for treatment in DEMO_TREATMENTS {
            let lookup = format!(
                "SELECT id FROM treatments WHERE code = {}",
                quote_literal(treatment.code)
            );
            if skip_existing {
                if let Some(id) = select_id(db, &lookup, self.category()).await? {
                    debug!(code = treatment.code, id, "treatment already present");
                    result.id_map.insert(treatment.code.to_string(), id);
                    result.skipped += 1;
                    continue;
                }
            }
            let insert = format!(
                "INSERT INTO treatments (code, name, category, cost, status) \
                 VALUES ({}, {}, {}, {}, 'active')",
                quote_literal(treatment.code),
                quote_literal(treatment.name),
                quote_literal(treatment.category),
                treatment.cost
            );
            db.execute(&insert).await?;
            let id = select_id(db, &lookup, self.category()).await?.ok_or_else(|| {
                MigrateError::seed(
                    self.category(),
                    format!("treatment {} not found after insert", treatment.code),
                )
            })?;
            result.id_map.insert(treatment.code.to_string(), id);
            result.loaded += 1;
        }
        Ok(result)
    }
}
