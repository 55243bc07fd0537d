use std::collections::BTreeSet;

use super::model::Orbital;
use crate::error::{EngineError, Result};

/// Canonical lm-decomposed channel names in the order VASP writes them.
pub const ORBITAL_NAMES: [&str; 16] = [
    "s",
    "p_y",
    "p_z",
    "p_x",
    "d_xy",
    "d_yz",
    "d_z2",
    "d_xz",
    "d_x2-y2",
    "f_y(3x2-y2)",
    "f_xyz",
    "f_yz2",
    "f_z3",
    "f_xz2",
    "f_z(x2-y2)",
    "f_x(x2-3y2)",
];

/// Shorthand tokens and the channels they cover.
const SHORTHANDS: &[(&str, &[u32])] = &[
    ("p", &[1, 2, 3]),
    ("d", &[4, 5, 6, 7, 8]),
    ("f", &[9, 10, 11, 12, 13, 14, 15]),
    ("all", &[0, 1, 2, 3, 4, 5, 6, 7, 8]),
    ("Psum", &[1, 3]),
    ("Dsum", &[5, 7]),
];

/// Display name of a channel index, falling back to the bare index.
pub fn orbital_name(index: u32) -> String {
    ORBITAL_NAMES
        .get(index as usize)
        .map(|n| n.to_string())
        .unwrap_or_else(|| index.to_string())
}

/// Display name of an orbital column value.
pub fn describe_orbital(orbital: &Orbital) -> String {
    match orbital {
        Orbital::Index(i) => orbital_name(*i),
        Orbital::Composite(label) => {
            let members = SHORTHANDS
                .iter()
                .find(|(token, _)| *token == label.as_str())
                .map(|(_, idx)| idx.iter().map(|&i| orbital_name(i)).collect::<Vec<_>>());
            match members {
                Some(names) if label.ends_with("sum") => names.join(" + "),
                _ => label.clone(),
            }
        }
    }
}

/// Resolve a single channel token (name or index) to its index.
pub fn orbital_index(token: &str) -> Result<u32> {
    let token = token.trim();
    if let Ok(i) = token.parse::<u32>() {
        return Ok(i);
    }
    ORBITAL_NAMES
        .iter()
        .position(|n| *n == token)
        .map(|i| i as u32)
        .ok_or_else(|| EngineError::UnknownOrbital(token.to_string()))
}

/// A labelled set of orbital channels summed into one derived channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrbitalGroup {
    label: String,
    members: BTreeSet<u32>,
}

impl OrbitalGroup {
    /// The label must not look like a channel index, otherwise derived rows
    /// could not be told apart from raw rows once persisted.
    pub fn new(label: impl Into<String>, members: impl IntoIterator<Item = u32>) -> Result<Self> {
        let label = label.into();
        if label.trim().is_empty() || label.trim().parse::<u32>().is_ok() {
            return Err(EngineError::InvalidPredicateCombination(format!(
                "orbital group label '{label}' must be a non-numeric name"
            )));
        }
        let members: BTreeSet<u32> = members.into_iter().collect();
        if members.is_empty() {
            return Err(EngineError::InvalidPredicateCombination(format!(
                "orbital group '{label}' has no members"
            )));
        }
        Ok(Self { label, members })
    }

    /// Look up a shorthand (`p`, `d`, `Psum`, ...), a channel name (`d_z2`) or
    /// a bare index (`4`).
    pub fn lookup(token: &str) -> Result<Self> {
        let token = token.trim();
        if let Some((label, members)) = SHORTHANDS.iter().find(|(t, _)| *t == token) {
            return Self::new(*label, members.iter().copied());
        }
        let index = orbital_index(token)?;
        Ok(Self {
            label: orbital_name(index),
            members: BTreeSet::from([index]),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn members(&self) -> &BTreeSet<u32> {
        &self.members
    }

    pub fn contains(&self, index: u32) -> bool {
        self.members.contains(&index)
    }

    /// Orbital column value used for rows derived from this group.
    pub fn as_orbital(&self) -> Orbital {
        Orbital::Composite(self.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_tokens_expand() {
        let p = OrbitalGroup::lookup("p").unwrap();
        assert_eq!(p.members().iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        let d = OrbitalGroup::lookup("d").unwrap();
        assert_eq!(d.members().len(), 5);
        let psum = OrbitalGroup::lookup("Psum").unwrap();
        assert!(psum.contains(1) && psum.contains(3) && !psum.contains(2));
        assert_eq!(OrbitalGroup::lookup("all").unwrap().members().len(), 9);
    }

    #[test]
    fn channel_names_and_indices_resolve() {
        assert_eq!(orbital_index("d_z2").unwrap(), 6);
        assert_eq!(orbital_index("12").unwrap(), 12);
        let g = OrbitalGroup::lookup("p_x").unwrap();
        assert_eq!(g.label(), "p_x");
        assert!(g.contains(3));
    }

    #[test]
    fn unknown_token_is_an_error() {
        assert!(matches!(
            OrbitalGroup::lookup("g_xyz"),
            Err(EngineError::UnknownOrbital(_))
        ));
    }

    #[test]
    fn numeric_or_empty_groups_are_rejected() {
        assert!(OrbitalGroup::new("7", [1]).is_err());
        assert!(OrbitalGroup::new("x", []).is_err());
    }

    #[test]
    fn composites_describe_their_members() {
        assert_eq!(
            describe_orbital(&Orbital::Composite("Psum".into())),
            "p_y + p_x"
        );
        assert_eq!(describe_orbital(&Orbital::Index(0)), "s");
        assert_eq!(describe_orbital(&Orbital::Index(40)), "40");
    }
}
