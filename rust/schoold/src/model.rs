use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use thiserror::Error;

/// Rejections raised when a record enters the system. Point-of-use code
/// (resolver, matrix, roll numbers) assumes records already passed these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("elective group name must not be empty")]
    EmptyGroupName,
    #[error("elective group {0:?} has no subjects")]
    EmptyGroup(String),
    #[error("elective group {0:?} is listed more than once")]
    DuplicateGroup(String),
    #[error("more than one selection for elective group {0:?}")]
    DuplicateSelection(String),
    #[error("unknown elective group {0:?}")]
    UnknownGroup(String),
    #[error("{subject:?} is not a subject of elective group {group:?}")]
    SubjectNotInGroup { group: String, subject: String },
    #[error("testDate must be YYYY-MM-DD, got {0:?}")]
    BadDate(String),
    #[error("maxMarks must be a positive number")]
    BadMaxMarks,
}

impl ValidationError {
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ValidationError::EmptyField(field) => Some(json!({ "field": field })),
            ValidationError::EmptyGroupName => None,
            ValidationError::EmptyGroup(g)
            | ValidationError::DuplicateGroup(g)
            | ValidationError::DuplicateSelection(g)
            | ValidationError::UnknownGroup(g) => Some(json!({ "groupName": g })),
            ValidationError::SubjectNotInGroup { group, subject } => {
                Some(json!({ "groupName": group, "subject": subject }))
            }
            ValidationError::BadDate(d) => Some(json!({ "testDate": d })),
            ValidationError::BadMaxMarks => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectiveGroup {
    pub group_name: String,
    pub subjects: Vec<String>,
}

impl ElectiveGroup {
    #[cfg(test)]
    pub fn new<S: Into<String>>(group_name: S, subjects: &[&str]) -> Self {
        Self {
            group_name: group_name.into(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.subjects.iter().any(|s| s == subject)
    }

    fn normalized(self) -> Result<Self, ValidationError> {
        let group_name = self.group_name.trim().to_string();
        if group_name.is_empty() {
            return Err(ValidationError::EmptyGroupName);
        }
        let subjects = normalize_subjects(self.subjects);
        if subjects.is_empty() {
            return Err(ValidationError::EmptyGroup(group_name));
        }
        Ok(Self {
            group_name,
            subjects,
        })
    }
}

/// Subjects offered to one (year, class, division).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMapping {
    #[serde(default)]
    pub id: String,
    pub year: String,
    pub class: String,
    pub division: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub elective_groups: Vec<ElectiveGroup>,
}

impl ClassMapping {
    pub fn validated(self) -> Result<Self, ValidationError> {
        let year = required(self.year, "year")?;
        let class = required(self.class, "class")?;
        let division = required(self.division, "division")?;

        let mut seen = HashSet::new();
        let mut elective_groups = Vec::with_capacity(self.elective_groups.len());
        for group in self.elective_groups {
            let group = group.normalized()?;
            if !seen.insert(group.group_name.clone()) {
                return Err(ValidationError::DuplicateGroup(group.group_name));
            }
            elective_groups.push(group);
        }

        Ok(Self {
            id: self.id,
            year,
            class,
            division,
            subjects: normalize_subjects(self.subjects),
            elective_groups,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectiveSelection {
    pub group_name: String,
    pub selected_subject: String,
}

#[cfg(test)]
impl ElectiveSelection {
    pub fn new<S: Into<String>>(group_name: S, selected_subject: S) -> Self {
        Self {
            group_name: group_name.into(),
            selected_subject: selected_subject.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default)]
    pub id: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub class: String,
    pub division: String,
    #[serde(default)]
    pub roll_number: i64,
    #[serde(default)]
    pub selected_elective_groups: Vec<ElectiveSelection>,
}

impl Student {
    pub fn selection_for(&self, group_name: &str) -> Option<&str> {
        self.selected_elective_groups
            .iter()
            .find(|s| s.group_name == group_name)
            .map(|s| s.selected_subject.as_str())
    }

    pub fn display_name(&self, with_middle: bool) -> String {
        let mut parts: Vec<&str> = vec![self.first_name.as_str()];
        if with_middle {
            if let Some(m) = self.middle_name.as_deref() {
                parts.push(m);
            }
        }
        if let Some(l) = self.last_name.as_deref() {
            parts.push(l);
        }
        parts
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Trims names and scope. An empty first name is allowed here; it
    /// simply sorts first.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        Ok(Self {
            id: self.id,
            first_name: self.first_name.trim().to_string(),
            middle_name: optional(self.middle_name),
            last_name: optional(self.last_name),
            class: required(self.class, "class")?,
            division: required(self.division, "division")?,
            roll_number: self.roll_number,
            selected_elective_groups: self.selected_elective_groups,
        })
    }
}

/// Checks a student's selections. With `groups` present every selection
/// must name one of them and pick a member subject.
pub fn validate_selections(
    selections: Vec<ElectiveSelection>,
    groups: Option<&[ElectiveGroup]>,
) -> Result<Vec<ElectiveSelection>, ValidationError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(selections.len());
    for sel in selections {
        let group_name = required(sel.group_name, "groupName")?;
        let selected_subject = required(sel.selected_subject, "selectedSubject")?;
        if !seen.insert(group_name.clone()) {
            return Err(ValidationError::DuplicateSelection(group_name));
        }
        if let Some(groups) = groups {
            let Some(group) = groups.iter().find(|g| g.group_name == group_name) else {
                return Err(ValidationError::UnknownGroup(group_name));
            };
            if !group.contains(&selected_subject) {
                return Err(ValidationError::SubjectNotInGroup {
                    group: group_name,
                    subject: selected_subject,
                });
            }
        }
        out.push(ElectiveSelection {
            group_name,
            selected_subject,
        });
    }
    Ok(out)
}

/// Keeps only selections naming a group of `groups` and one of its subjects.
pub fn resolvable_selections(
    selections: Vec<ElectiveSelection>,
    groups: &[ElectiveGroup],
) -> Vec<ElectiveSelection> {
    selections
        .into_iter()
        .filter(|sel| {
            groups
                .iter()
                .any(|g| g.group_name == sel.group_name && g.contains(&sel.selected_subject))
        })
        .collect()
}

/// One examined subject (or elective group) on one day of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodicTest {
    #[serde(default)]
    pub id: String,
    pub test_name: String,
    pub year: String,
    pub class: String,
    pub subject: String,
    pub test_date: String,
    #[serde(default)]
    pub max_marks: Option<f64>,
}

impl PeriodicTest {
    pub fn validated(self) -> Result<Self, ValidationError> {
        let test_date = required(self.test_date, "testDate")?;
        if NaiveDate::parse_from_str(&test_date, "%Y-%m-%d").is_err() {
            return Err(ValidationError::BadDate(test_date));
        }
        if let Some(m) = self.max_marks {
            if !(m.is_finite() && m > 0.0) {
                return Err(ValidationError::BadMaxMarks);
            }
        }
        Ok(Self {
            id: self.id,
            test_name: required(self.test_name, "testName")?,
            year: required(self.year, "year")?,
            class: required(self.class, "class")?,
            subject: required(self.subject, "subject")?,
            test_date,
            max_marks: self.max_marks,
        })
    }
}

fn required(value: String, field: &'static str) -> Result<String, ValidationError> {
    let t = value.trim();
    if t.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(t.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Trim, drop blanks, de-duplicate keeping first occurrence.
fn normalize_subjects(subjects: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    subjects
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(groups: Vec<ElectiveGroup>) -> ClassMapping {
        ClassMapping {
            id: String::new(),
            year: " 2024-25 ".into(),
            class: "X".into(),
            division: "A".into(),
            subjects: vec!["Math".into(), " Math".into(), "".into(), "English".into()],
            elective_groups: groups,
        }
    }

    #[test]
    fn class_mapping_trims_and_dedupes_subjects() {
        let m = mapping(vec![]).validated().expect("valid mapping");
        assert_eq!(m.year, "2024-25");
        assert_eq!(m.subjects, vec!["Math".to_string(), "English".to_string()]);
    }

    #[test]
    fn class_mapping_rejects_empty_and_duplicate_groups() {
        let e = mapping(vec![ElectiveGroup::new("Elective A", &[" "])])
            .validated()
            .unwrap_err();
        assert_eq!(e, ValidationError::EmptyGroup("Elective A".into()));

        let e = mapping(vec![
            ElectiveGroup::new("Elective A", &["Physics"]),
            ElectiveGroup::new(" Elective A", &["Biology"]),
        ])
        .validated()
        .unwrap_err();
        assert_eq!(e, ValidationError::DuplicateGroup("Elective A".into()));
    }

    #[test]
    fn selections_must_match_known_groups() {
        let groups = vec![ElectiveGroup::new("Elective A", &["Physics", "Biology"])];
        let ok = validate_selections(
            vec![ElectiveSelection::new("Elective A", "Physics")],
            Some(&groups),
        )
        .expect("valid selection");
        assert_eq!(ok.len(), 1);

        let e = validate_selections(
            vec![ElectiveSelection::new("Elective A", "History")],
            Some(&groups),
        )
        .unwrap_err();
        assert!(matches!(e, ValidationError::SubjectNotInGroup { .. }));

        let e = validate_selections(
            vec![
                ElectiveSelection::new("Elective A", "Physics"),
                ElectiveSelection::new("Elective A", "Biology"),
            ],
            None,
        )
        .unwrap_err();
        assert_eq!(e, ValidationError::DuplicateSelection("Elective A".into()));
    }

    #[test]
    fn resolvable_selections_drop_unknown_groups_and_subjects() {
        let groups = vec![
            ElectiveGroup::new("Elective A", &["Physics", "Biology"]),
            ElectiveGroup::new("Language", &["French"]),
        ];
        let kept = resolvable_selections(
            vec![
                ElectiveSelection::new("Elective A", "Physics"),
                ElectiveSelection::new("Language", "German"),
                ElectiveSelection::new("Elective B", "History"),
            ],
            &groups,
        );
        assert_eq!(kept, vec![ElectiveSelection::new("Elective A", "Physics")]);
        assert!(resolvable_selections(kept, &[]).is_empty());
    }

    #[test]
    fn periodic_test_date_is_checked() {
        let t = PeriodicTest {
            id: String::new(),
            test_name: "PT1".into(),
            year: "2024-25".into(),
            class: "X".into(),
            subject: "Math".into(),
            test_date: "2024-13-01".into(),
            max_marks: Some(25.0),
        };
        assert_eq!(
            t.validated().unwrap_err(),
            ValidationError::BadDate("2024-13-01".into())
        );
    }

    #[test]
    fn display_name_skips_missing_parts() {
        let s = Student {
            id: "s1".into(),
            first_name: "Amy".into(),
            middle_name: Some("Jo".into()),
            last_name: None,
            class: "X".into(),
            division: "A".into(),
            roll_number: 1,
            selected_elective_groups: vec![],
        };
        assert_eq!(s.display_name(false), "Amy");
        assert_eq!(s.display_name(true), "Amy Jo");
    }
}
