//! Pairing observed m/z values with predictions within an absolute tolerance.

use supramol_shared::{Id, MzMatch, MzObserved, MzPredicted, Result, Stored, SupramolError};

/// An observed value and a prediction it agrees with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MzPair {
    pub mz_observed_id: Id,
    pub mz_predicted_id: Id,
}

impl MzPair {
    pub fn with_tolerance(self, mz_tolerance_id: Id) -> MzMatch {
        MzMatch {
            mz_observed_id: self.mz_observed_id,
            mz_predicted_id: self.mz_predicted_id,
            mz_tolerance_id,
        }
    }
}

pub fn validate_atol(atol: f64) -> Result<()> {
    if !atol.is_finite() || atol < 0.0 {
        return Err(SupramolError::validation(format!(
            "m/z tolerance must be a finite non-negative number, got {atol}"
        )));
    }
    Ok(())
}

/// Every pair with `|observed - predicted| <= atol`, ordered by observed id
/// then predicted id. One observed value may match several predictions.
pub fn match_mz(
    observed: &[Stored<MzObserved>],
    predicted: &[Stored<MzPredicted>],
    atol: f64,
) -> Result<Vec<MzPair>> {
    validate_atol(atol)?;

    let mut pairs: Vec<MzPair> = observed
        .iter()
        .flat_map(|o| {
            predicted
                .iter()
                .filter(move |p| (o.mz_value - p.mz_value).abs() <= atol)
                .map(move |p| MzPair {
                    mz_observed_id: o.id,
                    mz_predicted_id: p.id,
                })
        })
        .collect();
    pairs.sort_by_key(|p| (p.mz_observed_id, p.mz_predicted_id));
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(id: Id, mz_value: f64) -> Stored<MzObserved> {
        Stored::new(
            id,
            MzObserved {
                ms_data_id: 1,
                mz_value,
            },
        )
    }

    fn predicted(id: Id, charge: i64, mz_value: f64) -> Stored<MzPredicted> {
        Stored::new(
            id,
            MzPredicted {
                assembly_id: 1,
                n_anions: 0,
                exact_mass: mz_value * charge as f64,
                charge,
                mz_value,
            },
        )
    }

    #[test]
    fn matches_cage_peaks() {
        let obs = vec![
            observed(1, 227.1),
            observed(2, 324.3),
            observed(3, 518.35),
            observed(4, 700.0),
        ];
        let pred = vec![
            predicted(10, 4, 518.3),
            predicted(11, 6, 324.2),
            predicted(12, 8, 227.2),
        ];

        let pairs = match_mz(&obs, &pred, 0.2).unwrap();
        let ids: Vec<(Id, Id)> = pairs
            .iter()
            .map(|p| (p.mz_observed_id, p.mz_predicted_id))
            .collect();
        assert_eq!(ids, vec![(1, 12), (2, 11), (3, 10)]);
    }

    #[test]
    fn tolerance_is_inclusive() {
        let obs = vec![observed(1, 100.5)];
        let pred = vec![predicted(2, 1, 100.0)];
        assert_eq!(match_mz(&obs, &pred, 0.5).unwrap().len(), 1);
        assert!(match_mz(&obs, &pred, 0.49).unwrap().is_empty());
    }

    #[test]
    fn one_value_may_match_several_predictions() {
        let obs = vec![observed(1, 300.0)];
        let pred = vec![predicted(5, 2, 300.1), predicted(4, 3, 299.9)];
        let pairs = match_mz(&obs, &pred, 0.2).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].mz_predicted_id, 4);
    }

    #[test]
    fn invalid_tolerance_rejected() {
        assert!(match_mz(&[], &[], -0.1).is_err());
        assert!(match_mz(&[], &[], f64::NAN).is_err());
        assert!(match_mz(&[], &[], f64::INFINITY).is_err());
        assert!(match_mz(&[], &[], 0.0).unwrap().is_empty());
    }
}
