//! Ions, reagents and cheminformatics descriptors.

use libsql::{Row, params};
use supramol_shared::{
    Descriptor, Id, Ion, Reagent, ReagentDescriptor, ReagentKind, ReagentRole, Result, Stored,
    SupramolError,
};

use crate::{Storage, col_f64, col_i64, col_opt_i64, col_opt_string, col_string, storage_err};

/// Base columns joined with every role table; role-specific columns follow.
const REAGENT_SELECT: &str = "SELECT r.id, r.cas_number, r.name, r.exact_mass, r.role,
        m.cation_id, m.num_cations, m.anion_id, m.num_anions,
        COALESCE(a.nmr_data, c.nmr_data)
     FROM reagent r
     LEFT JOIN metal m ON m.id = r.id
     LEFT JOIN amine a ON a.id = r.id
     LEFT JOIN carbonyl c ON c.id = r.id";

/// A descriptor value joined with the descriptor name.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorValue {
    pub descriptor: Stored<Descriptor>,
    pub value: ReagentDescriptor,
}

impl Storage {
    // -----------------------------------------------------------------------
    // Ions
    // -----------------------------------------------------------------------

    /// Insert an ion. Returns its id.
    pub async fn insert_ion(&self, ion: &Ion) -> Result<Id> {
        self.insert(
            "INSERT INTO ion (name, charge, formula, exact_mass) VALUES (?1, ?2, ?3, ?4)",
            params![ion.name.as_str(), ion.charge, ion.formula.as_str(), ion.exact_mass],
        )
        .await
    }

    /// Get an ion by id.
    pub async fn get_ion(&self, id: Id) -> Result<Option<Stored<Ion>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, charge, formula, exact_mass FROM ion WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_ion(&row)?)),
            None => Ok(None),
        }
    }

    /// List all ions by id.
    pub async fn list_ions(&self) -> Result<Vec<Stored<Ion>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, charge, formula, exact_mass FROM ion ORDER BY id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_ion(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Reagents
    // -----------------------------------------------------------------------

    /// Insert a reagent into the base table and its role table atomically.
    pub async fn insert_reagent(&self, reagent: &Reagent) -> Result<Id> {
        let id = self
            .in_savepoint("insert_reagent", || self.insert_reagent_rows(reagent))
            .await?;
        tracing::debug!(id, name = %reagent.name, role = %reagent.role(), "inserted reagent");
        Ok(id)
    }

    async fn insert_reagent_rows(&self, reagent: &Reagent) -> Result<Id> {
        let id = self
            .insert(
                "INSERT INTO reagent (cas_number, name, exact_mass, role) VALUES (?1, ?2, ?3, ?4)",
                params![
                    reagent.cas_number.as_deref(),
                    reagent.name.as_str(),
                    reagent.exact_mass,
                    reagent.role().as_str(),
                ],
            )
            .await?;

        match &reagent.kind {
            ReagentKind::Metal {
                cation_id,
                num_cations,
                anion_id,
                num_anions,
            } => {
                self.insert(
                    "INSERT INTO metal (id, cation_id, num_cations, anion_id, num_anions)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, *cation_id, *num_cations, *anion_id, *num_anions],
                )
                .await?;
            }
            ReagentKind::Amine { nmr_data } => {
                self.insert(
                    "INSERT INTO amine (id, nmr_data) VALUES (?1, ?2)",
                    params![id, nmr_data.as_deref()],
                )
                .await?;
            }
            ReagentKind::Carbonyl { nmr_data } => {
                self.insert(
                    "INSERT INTO carbonyl (id, nmr_data) VALUES (?1, ?2)",
                    params![id, nmr_data.as_deref()],
                )
                .await?;
            }
        }
        Ok(id)
    }

    /// Get a reagent by id.
    pub async fn get_reagent(&self, id: Id) -> Result<Option<Stored<Reagent>>> {
        let mut rows = self
            .conn
            .query(&format!("{REAGENT_SELECT} WHERE r.id = ?1"), params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_reagent(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a reagent by its CAS number.
    pub async fn get_reagent_by_cas(&self, cas_number: &str) -> Result<Option<Stored<Reagent>>> {
        let mut rows = self
            .conn
            .query(
                &format!("{REAGENT_SELECT} WHERE r.cas_number = ?1"),
                params![cas_number],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_reagent(&row)?)),
            None => Ok(None),
        }
    }

    /// List reagents ordered by name, optionally restricted to one role.
    pub async fn list_reagents(&self, role: Option<ReagentRole>) -> Result<Vec<Stored<Reagent>>> {
        let mut rows = match role {
            Some(role) => {
                self.conn
                    .query(
                        &format!("{REAGENT_SELECT} WHERE r.role = ?1 ORDER BY r.name"),
                        params![role.as_str()],
                    )
                    .await
            }
            None => {
                self.conn
                    .query(&format!("{REAGENT_SELECT} ORDER BY r.name"), params![])
                    .await
            }
        }
        .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_reagent(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Descriptors
    // -----------------------------------------------------------------------

    /// Insert a descriptor. Names are unique.
    pub async fn insert_descriptor(&self, descriptor: &Descriptor) -> Result<Id> {
        self.insert(
            "INSERT INTO descriptor (name) VALUES (?1)",
            params![descriptor.name.as_str()],
        )
        .await
    }

    /// Get the id of the descriptor called `name`, creating it if needed.
    pub async fn get_or_insert_descriptor(&self, name: &str) -> Result<Id> {
        let mut rows = self
            .conn
            .query("SELECT id FROM descriptor WHERE name = ?1", params![name])
            .await
            .map_err(storage_err)?;

        let existing = match rows.next().await.map_err(storage_err)? {
            Some(row) => Some(col_i64(&row, 0)?),
            None => None,
        };
        drop(rows);

        if let Some(id) = existing {
            return Ok(id);
        }
        self.insert_descriptor(&Descriptor { name: name.into() })
            .await
    }

    /// Attach a descriptor value to a reagent.
    pub async fn add_reagent_descriptor(&self, value: &ReagentDescriptor) -> Result<()> {
        self.insert(
            "INSERT INTO reagent_descriptor (reagent_id, descriptor_id, value) VALUES (?1, ?2, ?3)",
            params![value.reagent_id, value.descriptor_id, value.value.as_str()],
        )
        .await?;
        Ok(())
    }

    /// All descriptor values of a reagent, ordered by descriptor name.
    pub async fn list_reagent_descriptors(&self, reagent_id: Id) -> Result<Vec<DescriptorValue>> {
        let mut rows = self
            .conn
            .query(
                "SELECT d.id, d.name, rd.value
                 FROM reagent_descriptor rd
                 JOIN descriptor d ON d.id = rd.descriptor_id
                 WHERE rd.reagent_id = ?1
                 ORDER BY d.name",
                params![reagent_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let descriptor_id = col_i64(&row, 0)?;
            results.push(DescriptorValue {
                descriptor: Stored::new(
                    descriptor_id,
                    Descriptor {
                        name: col_string(&row, 1)?,
                    },
                ),
                value: ReagentDescriptor {
                    reagent_id,
                    descriptor_id,
                    value: col_string(&row, 2)?,
                },
            });
        }
        Ok(results)
    }
}

fn row_to_ion(row: &Row) -> Result<Stored<Ion>> {
    Ok(Stored::new(
        col_i64(row, 0)?,
        Ion {
            name: col_string(row, 1)?,
            charge: col_i64(row, 2)?,
            formula: col_string(row, 3)?,
            exact_mass: col_f64(row, 4)?,
        },
    ))
}

/// Convert a row of [`REAGENT_SELECT`] to a reagent.
fn row_to_reagent(row: &Row) -> Result<Stored<Reagent>> {
    let id = col_i64(row, 0)?;
    let role: ReagentRole = col_string(row, 4)?.parse()?;

    let kind = match role {
        ReagentRole::Metal => {
            let missing = || SupramolError::Storage(format!("metal reagent {id} has no metal row"));
            ReagentKind::Metal {
                cation_id: col_opt_i64(row, 5).ok_or_else(missing)?,
                num_cations: col_opt_i64(row, 6).ok_or_else(missing)?,
                anion_id: col_opt_i64(row, 7).ok_or_else(missing)?,
                num_anions: col_opt_i64(row, 8).ok_or_else(missing)?,
            }
        }
        ReagentRole::Amine => ReagentKind::Amine {
            nmr_data: col_opt_string(row, 9),
        },
        ReagentRole::Carbonyl => ReagentKind::Carbonyl {
            nmr_data: col_opt_string(row, 9),
        },
    };

    Ok(Stored::new(
        id,
        Reagent {
            cas_number: col_opt_string(row, 1),
            name: col_string(row, 2)?,
            exact_mass: col_f64(row, 3)?,
            kind,
        },
    ))
}
