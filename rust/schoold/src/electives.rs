use crate::model::{ClassMapping, ElectiveGroup, PeriodicTest};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// How a scheduled test subject is correlated with an elective group name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupMatch {
    /// Equal, or either string contains the other. "Elective 1" also
    /// matches a test subject "Elective 10".
    #[default]
    Substring,
    Exact,
}

impl GroupMatch {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "substring" => Some(Self::Substring),
            "exact" => Some(Self::Exact),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Substring => "substring",
            Self::Exact => "exact",
        }
    }

    fn matches(self, test_subject: &str, group_name: &str) -> bool {
        match self {
            Self::Exact => test_subject == group_name,
            Self::Substring => {
                test_subject.contains(group_name) || group_name.contains(test_subject)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSubjects {
    pub core_subjects: Vec<String>,
    pub elective_groups: Vec<ElectiveGroup>,
}

#[cfg(test)]
impl ResolvedSubjects {
    pub fn is_empty(&self) -> bool {
        self.core_subjects.is_empty() && self.elective_groups.is_empty()
    }
}

/// Core subjects and elective groups taught in `target_class`, unioned over
/// every division (first-seen order). With `test_subjects` the result is
/// narrowed to what a specific test actually examines.
pub fn resolve(
    mappings: &[ClassMapping],
    target_class: &str,
    test_subjects: Option<&HashSet<String>>,
    mode: GroupMatch,
) -> ResolvedSubjects {
    let mut core_subjects: Vec<String> = Vec::new();
    let mut core_seen: HashSet<&str> = HashSet::new();
    let mut elective_groups: Vec<ElectiveGroup> = Vec::new();
    let mut group_index: HashMap<&str, usize> = HashMap::new();

    for mapping in mappings.iter().filter(|m| m.class == target_class) {
        for subject in &mapping.subjects {
            if core_seen.insert(subject.as_str()) {
                core_subjects.push(subject.clone());
            }
        }
        for group in &mapping.elective_groups {
            match group_index.get(group.group_name.as_str()) {
                Some(&i) => {
                    let merged = &mut elective_groups[i];
                    for subject in &group.subjects {
                        if !merged.contains(subject) {
                            merged.subjects.push(subject.clone());
                        }
                    }
                }
                None => {
                    group_index.insert(group.group_name.as_str(), elective_groups.len());
                    elective_groups.push(group.clone());
                }
            }
        }
    }

    if let Some(scheduled) = test_subjects {
        core_subjects.retain(|s| scheduled.contains(s));
        elective_groups.retain(|g| {
            scheduled
                .iter()
                .any(|s| mode.matches(s, &g.group_name))
        });
    }

    ResolvedSubjects {
        core_subjects,
        elective_groups,
    }
}

/// Subjects scheduled for one test occurrence, i.e. every row sharing
/// (testName, year, class).
pub fn scheduled_subjects<'a, I>(tests: I, test_name: &str, year: &str, class: &str) -> HashSet<String>
where
    I: IntoIterator<Item = &'a PeriodicTest>,
{
    tests
        .into_iter()
        .filter(|t| t.test_name == test_name && t.year == year && t.class == class)
        .map(|t| t.subject.clone())
        .collect()
}
