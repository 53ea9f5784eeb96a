use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

const RECENT_LIMIT: usize = 5;
const VISIT_WEIGHT: f64 = 0.1;
const DEFAULT_DOMAIN_WEIGHT: f64 = 0.5;
const EXPERT_THRESHOLD: f64 = 0.7;
const SUMMARY_INTERESTS: usize = 3;

/// Navigation state of the person browsing the collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    /// Interest weight per top-level folder, in `0.0..=1.0`.
    pub domains: BTreeMap<String, f64>,
    pub expertise: BTreeMap<String, f64>,
    /// Most recent visited paths, oldest first.
    pub recent: Vec<String>,
}

impl UserProfile {
    /// Read a profile from `path`. A missing file yields an empty profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn record_visit(&mut self, path: &str) {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return;
        }
        let domain = top_level(path).to_owned();
        let weight = self.domains.entry(domain).or_insert(0.0);
        *weight = (*weight + VISIT_WEIGHT).min(1.0);

        self.recent.push(path.to_owned());
        if self.recent.len() > RECENT_LIMIT {
            let excess = self.recent.len() - RECENT_LIMIT;
            self.recent.drain(..excess);
        }
    }

    /// Weight applied to a top-level folder's representation.
    #[must_use]
    pub fn domain_weight(&self, domain: &str) -> f64 {
        self.domains
            .get(domain)
            .copied()
            .unwrap_or(DEFAULT_DOMAIN_WEIGHT)
    }

    /// Text describing the profile; never empty.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec!["Personal knowledge profile".to_owned()];
        let interests = self.top_interests();
        if !interests.is_empty() {
            let names: Vec<&str> = interests
                .iter()
                .take(SUMMARY_INTERESTS)
                .map(|(d, _)| d.as_str())
                .collect();
            parts.push(format!("Primary interests: {}", names.join(", ")));
        }
        let experts: Vec<&str> = self
            .expertise
            .iter()
            .filter(|(_, level)| **level > EXPERT_THRESHOLD)
            .map(|(d, _)| d.as_str())
            .collect();
        if !experts.is_empty() {
            parts.push(format!("Expert in: {}", experts.join(", ")));
        }
        parts.join(" ")
    }

    /// Likely next destination from `current`: the most frequent successor of `current`
    /// among recent visits in the same domain, else the domain with the highest interest.
    #[must_use]
    pub fn predict_next(&self, current: &str) -> Option<String> {
        let current = current.trim_matches('/');
        let domain = top_level(current);
        let in_domain: Vec<&str> = self
            .recent
            .iter()
            .map(String::as_str)
            .filter(|p| top_level(p) == domain)
            .collect();

        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (i, pair) in in_domain.windows(2).enumerate() {
            if pair[0] == current {
                let entry = counts.entry(pair[1]).or_insert((0, i));
                entry.0 += 1;
            }
        }
        // Ties go to the successor seen first.
        if let Some((next, _)) = counts
            .into_iter()
            .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)))
        {
            return Some(next.to_owned());
        }

        self.top_interests().first().map(|(d, _)| d.clone())
    }

    fn top_interests(&self) -> Vec<(String, f64)> {
        let mut interests: Vec<(String, f64)> = self
            .domains
            .iter()
            .map(|(d, w)| (d.clone(), *w))
            .collect();
        interests.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        interests
    }
}

fn top_level(path: &str) -> &str {
    path.split('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visits_raise_domain_weight_up_to_one() {
        let mut profile = UserProfile::default();
        for _ in 0..15 {
            profile.record_visit("history/rome.txt");
        }
        assert!((profile.domains["history"] - 1.0).abs() < f64::EPSILON);
        assert!((profile.domain_weight("history") - 1.0).abs() < f64::EPSILON);
        assert!((profile.domain_weight("botany") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn recent_keeps_last_five() {
        let mut profile = UserProfile::default();
        for i in 0..8 {
            profile.record_visit(&format!("d/{i}.txt"));
        }
        assert_eq!(
            profile.recent,
            vec!["d/3.txt", "d/4.txt", "d/5.txt", "d/6.txt", "d/7.txt"]
        );
    }

    #[test]
    fn root_visit_is_ignored() {
        let mut profile = UserProfile::default();
        profile.record_visit("/");
        assert_eq!(profile, UserProfile::default());
    }

    #[test]
    fn summary_lists_interests_and_expertise() {
        let mut profile = UserProfile::default();
        assert_eq!(profile.summary(), "Personal knowledge profile");

        profile.record_visit("math/a.txt");
        profile.record_visit("math/b.txt");
        profile.record_visit("physics/c.txt");
        profile.expertise.insert("math".into(), 0.9);
        profile.expertise.insert("physics".into(), 0.2);
        assert_eq!(
            profile.summary(),
            "Personal knowledge profile Primary interests: math, physics Expert in: math"
        );
    }

    #[test]
    fn predict_next_prefers_observed_successor() {
        let mut profile = UserProfile::default();
        for p in ["h/a", "h/b", "h/a", "h/b", "h/a", "h/c"] {
            profile.record_visit(p);
        }
        // recent = [h/b, h/a, h/b, h/a, h/c]
        assert_eq!(profile.predict_next("h/a").as_deref(), Some("h/b"));
    }

    #[test]
    fn predict_next_falls_back_to_top_interest() {
        let mut profile = UserProfile::default();
        assert_eq!(profile.predict_next("x"), None);
        profile.record_visit("science/a.txt");
        profile.record_visit("science/b.txt");
        profile.record_visit("art/c.txt");
        assert_eq!(profile.predict_next("art/zzz").as_deref(), Some("science"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/profile.json");
        assert_eq!(UserProfile::load(&path).unwrap(), UserProfile::default());

        let mut profile = UserProfile::default();
        profile.record_visit("history/rome.txt");
        profile.save(&path).unwrap();
        assert_eq!(UserProfile::load(&path).unwrap(), profile);
    }

    #[test]
    fn malformed_profile_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            UserProfile::load(&path),
            Err(IndexError::Profile(_))
        ));
    }
}
