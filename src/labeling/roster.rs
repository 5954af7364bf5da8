//! Ordered identity roster with one display color per identity.

use image::Rgb;
use rand::Rng;

use crate::error::{LabelError, Result};
use crate::tracker::TRACKER_RECORD_FILE;

/// Label shown for tracks nobody has identified yet.
pub const NO_LABEL: &str = "No Label";
/// Neutral gray reserved for [`NO_LABEL`].
pub const SENTINEL_COLOR: Color = Rgb([200, 200, 200]);
/// Default minimum RGB distance between any two roster colors.
pub const MIN_COLOR_DISTANCE: f32 = 100.0;
/// Candidate draws allowed per color before giving up.
const MAX_COLOR_ATTEMPTS: usize = 100_000;

pub type Color = Rgb<u8>;

/// Index into the roster. Slot 0 is the "unassigned" sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentitySlot(pub usize);

impl IdentitySlot {
    pub const UNASSIGNED: IdentitySlot = IdentitySlot(0);

    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

/// Identities an annotator can give to tracks.
///
/// Append-only until [`Roster::freeze`], immutable afterwards. Colors only
/// exist once frozen.
#[derive(Debug, Clone)]
pub struct Roster {
    names: Vec<String>,
    colors: Option<Vec<Color>>,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    pub fn new() -> Self {
        Self {
            names: vec![NO_LABEL.to_string()],
            colors: None,
        }
    }

    /// Append an identity and return its slot.
    ///
    /// A name already on the roster (including the sentinel) is rejected
    /// with [`LabelError::AlreadyExists`] and leaves the roster unchanged.
    /// Names become folder names under the output directory, so anything
    /// that is not a single plain path component is rejected with
    /// [`LabelError::InvalidIdentityName`].
    pub fn declare(&mut self, name: &str) -> Result<IdentitySlot> {
        if self.is_frozen() {
            return Err(LabelError::RosterFrozen);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(LabelError::EmptyIdentityName);
        }
        if !is_folder_name(name) {
            return Err(LabelError::InvalidIdentityName(name.to_string()));
        }
        if self.slot_of(name).is_some() {
            return Err(LabelError::AlreadyExists(name.to_string()));
        }
        self.names.push(name.to_string());
        Ok(IdentitySlot(self.names.len() - 1))
    }

    /// Fix the roster and pick its colors with the thread RNG.
    pub fn freeze(&mut self, min_distance: f32) -> Result<()> {
        self.freeze_with_rng(&mut rand::thread_rng(), min_distance)
    }

    /// Fix the roster, drawing one color per identity by rejection sampling
    /// so every pair (sentinel gray included) is at least `min_distance`
    /// apart in RGB space.
    pub fn freeze_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R, min_distance: f32) -> Result<()> {
        if self.is_frozen() {
            return Err(LabelError::RosterFrozen);
        }
        let count = self.names.len();
        let mut colors = Vec::with_capacity(count);
        colors.push(SENTINEL_COLOR);

        while colors.len() < count {
            let accepted = (0..MAX_COLOR_ATTEMPTS).find_map(|_| {
                let candidate: Color = Rgb([rng.r#gen(), rng.r#gen(), rng.r#gen()]);
                colors
                    .iter()
                    .all(|c| color_distance(c, &candidate) >= min_distance)
                    .then_some(candidate)
            });
            match accepted {
                Some(color) => colors.push(color),
                None => {
                    return Err(LabelError::ColorSpaceExhausted {
                        count: count - 1,
                        min_distance,
                    });
                }
            }
        }

        log::info!("roster frozen with {} identities", count - 1);
        self.colors = Some(colors);
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.colors.is_some()
    }

    /// Number of slots, sentinel included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True while no identity besides the sentinel has been declared.
    pub fn is_empty(&self) -> bool {
        self.identity_count() == 0
    }

    /// Number of declared identities, sentinel excluded.
    pub fn identity_count(&self) -> usize {
        self.names.len() - 1
    }

    pub fn contains(&self, slot: IdentitySlot) -> bool {
        slot.0 < self.names.len()
    }

    pub fn name(&self, slot: IdentitySlot) -> Option<&str> {
        self.names.get(slot.0).map(String::as_str)
    }

    pub fn slot_of(&self, name: &str) -> Option<IdentitySlot> {
        self.names.iter().position(|n| n == name).map(IdentitySlot)
    }

    /// Display color for a slot; `None` before the roster is frozen.
    pub fn color(&self, slot: IdentitySlot) -> Option<Color> {
        self.colors.as_ref()?.get(slot.0).copied()
    }

    /// Declared identities in slot order, sentinel excluded.
    pub fn identities(&self) -> impl Iterator<Item = (IdentitySlot, &str)> {
        self.names
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, n)| (IdentitySlot(i), n.as_str()))
    }
}

/// A single plain path component that cannot shadow the run record.
fn is_folder_name(name: &str) -> bool {
    !matches!(name, "." | "..")
        && name != TRACKER_RECORD_FILE
        && !name.contains(['/', '\\', ':'])
}

pub fn color_distance(a: &Color, b: &Color) -> f32 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(&x, &y)| {
            let d = x as f32 - y as f32;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn roster(names: &[&str]) -> Roster {
        let mut roster = Roster::new();
        for name in names {
            roster.declare(name).unwrap();
        }
        roster
    }

    #[test]
    fn test_sentinel_is_slot_zero() {
        let roster = Roster::new();
        assert_eq!(roster.name(IdentitySlot::UNASSIGNED), Some(NO_LABEL));
        assert!(roster.is_empty());
        assert!(!IdentitySlot::UNASSIGNED.is_assigned());
    }

    #[test]
    fn test_declare_appends_in_order() {
        let mut roster = Roster::new();
        assert_eq!(roster.declare("Alice").unwrap(), IdentitySlot(1));
        assert_eq!(roster.declare("Bob").unwrap(), IdentitySlot(2));
        assert_eq!(roster.slot_of("Bob"), Some(IdentitySlot(2)));
        let names: Vec<&str> = roster.identities().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_duplicate_is_rejected_without_change() {
        let mut roster = roster(&["Alice"]);
        assert!(matches!(roster.declare("Alice"), Err(LabelError::AlreadyExists(n)) if n == "Alice"));
        assert!(matches!(roster.declare(NO_LABEL), Err(LabelError::AlreadyExists(_))));
        assert!(matches!(roster.declare("  "), Err(LabelError::EmptyIdentityName)));
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_names_stay_inside_output_dir() {
        let mut roster = roster(&["Alice"]);
        for name in ["../escaped", "/tmp/x", "a/b", "a\\b", ".", "..", "C:x", TRACKER_RECORD_FILE] {
            assert!(
                matches!(roster.declare(name), Err(LabelError::InvalidIdentityName(n)) if n == name),
                "{name} accepted"
            );
        }
        assert_eq!(roster.len(), 2);
        assert!(roster.declare("Dr. Who").is_ok());
    }

    #[test]
    fn test_frozen_roster_is_immutable() {
        let mut roster = roster(&["Alice"]);
        assert_eq!(roster.color(IdentitySlot(1)), None);
        roster.freeze(MIN_COLOR_DISTANCE).unwrap();

        assert!(matches!(roster.declare("Bob"), Err(LabelError::RosterFrozen)));
        assert!(matches!(
            roster.freeze(MIN_COLOR_DISTANCE),
            Err(LabelError::RosterFrozen)
        ));
        assert_eq!(roster.color(IdentitySlot::UNASSIGNED), Some(SENTINEL_COLOR));
    }

    #[test]
    fn test_colors_are_separated() {
        let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let mut roster = roster(&names);
        roster
            .freeze_with_rng(&mut StdRng::seed_from_u64(7), MIN_COLOR_DISTANCE)
            .unwrap();

        let colors: Vec<Color> = (0..roster.len())
            .map(|i| roster.color(IdentitySlot(i)).unwrap())
            .collect();
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert!(color_distance(a, b) >= MIN_COLOR_DISTANCE);
            }
        }
    }

    #[test]
    fn test_impossible_separation_is_reported() {
        let mut roster = roster(&["a", "b"]);
        let err = roster
            .freeze_with_rng(&mut StdRng::seed_from_u64(1), 1000.0)
            .unwrap_err();
        assert!(matches!(err, LabelError::ColorSpaceExhausted { count: 2, .. }));
        assert!(!roster.is_frozen());
    }
}
