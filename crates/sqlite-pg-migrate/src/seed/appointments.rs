//! Upcoming appointments. Keyed by the clinic's appointment id; the
//! patient reference goes through the identity map and degrades to NULL
//! when the external id is unknown.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::quote_literal;
use crate::db::DbHandle;
use crate::error::{MigrateError, Result};
use crate::seed::{select_id, IdentityMap, SeedLoader, SeedResult};

pub(crate) struct AppointmentSeed {
    pub appointment_id: &'static str,
    pub patient: &'static str,
    pub title: &'static str,
    pub date: &'static str,
    pub time: &'static str,
    pub treatment_type: &'static str,
    pub provider: &'static str,
    pub status: &'static str,
}

pub(crate) const DEMO_APPOINTMENTS: &[AppointmentSeed] = &[
    AppointmentSeed {
        appointment_id: "APT001",
        patient: "P001",
        title: "NAD+ IV Therapy",
        date: "2025-12-23",
        time: "09:00",
        treatment_type: "IV Therapy",
        provider: "Dr. Johnson",
        status: "confirmed",
    },
    AppointmentSeed {
        appointment_id: "APT002",
        patient: "P002",
        title: "Hyperbaric Oxygen Session",
        date: "2025-12-26",
        time: "14:00",
        treatment_type: "HBOT",
        provider: "Dr. Chen",
        status: "scheduled",
    },
    AppointmentSeed {
        appointment_id: "APT003",
        patient: "P003",
        title: "Biomarker Assessment",
        date: "2025-12-27",
        time: "10:30",
        treatment_type: "Assessment",
        provider: "Dr. Patel",
        status: "confirmed",
    },
    AppointmentSeed {
        appointment_id: "APT004",
        patient: "P004",
        title: "Stem Cell Consultation",
        date: "2025-12-30",
        time: "11:00",
        treatment_type: "Consultation",
        provider: "Dr. Johnson",
        status: "scheduled",
    },
    AppointmentSeed {
        appointment_id: "APT005",
        patient: "P001",
        title: "Peptide Therapy Follow-up",
        date: "2026-01-06",
        time: "15:30",
        treatment_type: "Follow-up",
        provider: "Dr. Chen",
        status: "scheduled",
    },
];

pub(crate) struct AppointmentLoader;

#[async_trait]
impl SeedLoader for AppointmentLoader {
    fn category(&self) -> &'static str {
        "appointments"
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
        let mut result = SeedResult::new(self.category());
        for appointment in DEMO_APPOINTMENTS {
            let lookup = format!(
                "SELECT id FROM appointments WHERE appointment_id = {}",
                quote_literal(appointment.appointment_id)
            );
            if skip_existing {
                if let Some(id) = select_id(db, &lookup, self.category()).await? {
                    debug!(
                        appointment_id = appointment.appointment_id,
                        id, "appointment already present"
                    );
                    result.skipped += 1;
                    continue;
                }
            }
            let user_ref = match identities.get(appointment.patient) {
                Some(id) => id.to_string(),
                None => {
                    warn!(
                        appointment_id = appointment.appointment_id,
                        patient = appointment.patient,
                        "patient not in identity map; storing appointment without a user link"
                    );
                    "NULL".to_string()
                }
            };
            let insert = format!(
                "INSERT INTO appointments \
                 (appointment_id, user_id, title, date, time, duration_minutes, \
                  treatment_type, provider, status) \
                 VALUES ({}, {user_ref}, {}, {}, {}, 60, {}, {}, {})",
                quote_literal(appointment.appointment_id),
                quote_literal(appointment.title),
                quote_literal(appointment.date),
                quote_literal(appointment.time),
                quote_literal(appointment.treatment_type),
                quote_literal(appointment.provider),
                quote_literal(appointment.status)
            );
            db.execute(&insert).await?;
            if select_id(db, &lookup, self.category()).await?.is_none() {
                return Err(MigrateError::seed(
                    self.category(),
                    format!(
                        "appointment {} not found after insert",
                        appointment.appointment_id
                    ),
                ));
            }
            result.loaded += 1;
        }
        Ok(result)
    }
}
