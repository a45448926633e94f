//! Assembly masses and the m/z values an assembly can show up at.
//!
//! An imine cage forms by condensing amine and carbonyl groups around metal
//! cations; every imine bond releases one water molecule. The cation of the
//! assembly may pair with some of the metal salt's counter-anions in the
//! spectrometer, so each assembly yields a ladder of charge states.

use supramol_shared::{AssemblyTopology, Id, Ion, MzPredicted, Reagent, Result, SupramolError};

/// Monoisotopic mass of H2O.
pub const WATER_EXACT_MASS: f64 = 18.010565;

/// Number of imine bonds formed, one per reactive amine group.
pub fn imine_bonds(topology: &AssemblyTopology) -> i64 {
    topology.n_amines * topology.amine_topicity
}

/// Check counts are non-negative and every amine group has a carbonyl partner.
pub fn validate_topology(topology: &AssemblyTopology) -> Result<()> {
    let counts = [
        ("n_metals", topology.n_metals),
        ("n_amines", topology.n_amines),
        ("n_carbonyls", topology.n_carbonyls),
        ("amine_topicity", topology.amine_topicity),
        ("carbonyl_topicity", topology.carbonyl_topicity),
        ("coordination_number", topology.coordination_number),
    ];
    if let Some((name, value)) = counts.iter().find(|(_, v)| *v < 0) {
        return Err(SupramolError::validation(format!(
            "topology {name} must not be negative, got {value}"
        )));
    }

    let carbonyl_groups = topology.n_carbonyls * topology.carbonyl_topicity;
    if imine_bonds(topology) != carbonyl_groups {
        return Err(SupramolError::validation(format!(
            "topology has {} amine groups but {carbonyl_groups} carbonyl groups",
            imine_bonds(topology)
        )));
    }
    Ok(())
}

/// Exact mass of the assembly cation, without counter-anions.
pub fn assembly_cation_mass(
    topology: &AssemblyTopology,
    cation: &Ion,
    amine: &Reagent,
    carbonyl: &Reagent,
) -> Result<f64> {
    validate_topology(topology)?;

    let mass = topology.n_metals as f64 * cation.exact_mass
        + topology.n_amines as f64 * amine.exact_mass
        + topology.n_carbonyls as f64 * carbonyl.exact_mass
        - imine_bonds(topology) as f64 * WATER_EXACT_MASS;
    Ok(mass)
}

/// Total charge of the assembly cation.
pub fn assembly_charge(topology: &AssemblyTopology, cation: &Ion) -> i64 {
    topology.n_metals * cation.charge
}

/// One charge state of an assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct MzPrediction {
    pub n_anions: i64,
    pub exact_mass: f64,
    pub charge: i64,
    pub mz_value: f64,
}

impl MzPrediction {
    pub fn into_record(self, assembly_id: Id) -> MzPredicted {
        MzPredicted {
            assembly_id,
            n_anions: self.n_anions,
            exact_mass: self.exact_mass,
            charge: self.charge,
            mz_value: self.mz_value,
        }
    }
}

/// Charge states from the bare cation downwards, adding one anion at a time
/// while the remaining charge stays at or above `min_charge`.
///
/// `min_charge` below 1 is treated as 1; neutral species have no m/z.
pub fn predict_mz(
    cation_mass: f64,
    total_charge: i64,
    anion: &Ion,
    min_charge: i64,
) -> Result<Vec<MzPrediction>> {
    if total_charge <= 0 {
        return Err(SupramolError::validation(format!(
            "assembly charge must be positive, got {total_charge}"
        )));
    }
    if anion.charge == 0 {
        return Err(SupramolError::validation(format!(
            "anion {} carries no charge",
            anion.name
        )));
    }

    let min_charge = min_charge.max(1);
    let step = anion.charge.abs();
    let mut predictions = Vec::new();
    let mut n_anions = 0;
    loop {
        let charge = total_charge - n_anions * step;
        if charge < min_charge {
            break;
        }
        let exact_mass = cation_mass + n_anions as f64 * anion.exact_mass;
        predictions.push(MzPrediction {
            n_anions,
            exact_mass,
            charge,
            mz_value: exact_mass / charge as f64,
        });
        n_anions += 1;
    }
    Ok(predictions)
}
