use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompanyEntry {
    #[schemars(description = "The company or contractor name as given by the user")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RoleEntry {
    #[schemars(description = "Person name, title-cased (e.g. 'Anna Smith')")]
    pub name: String,

    #[schemars(description = "Role on site, title-cased (e.g. 'Engineer', 'Supervisor')")]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ToolEntry {
    #[schemars(description = "A tool or piece of equipment present on site")]
    pub item: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceEntry {
    #[schemars(description = "A service task performed on site")]
    pub task: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IssueEntry {
    #[schemars(description = "What went wrong (required)")]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Who or what caused the issue, if stated")]
    pub caused_by: Option<String>,

    #[serde(default)]
    #[schemars(description = "Whether a photo of the issue was attached")]
    pub has_photo: bool,
}

impl IssueEntry {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            caused_by: None,
            has_photo: false,
        }
    }
}

/// The structured record built up over one conversation.
///
/// Scalar fields use `""` for "unset"; list fields use `[]`. Clearing a field
/// always restores that empty value, never a null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub segment: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub weather: String,
    #[serde(default)]
    pub impression: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub date: String,

    #[serde(default)]
    pub company: Vec<CompanyEntry>,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub roles: Vec<RoleEntry>,
    #[serde(default)]
    pub tools: Vec<ToolEntry>,
    #[serde(default)]
    pub service: Vec<ServiceEntry>,
    #[serde(default)]
    pub activities: Vec<String>,
    #[serde(default)]
    pub issues: Vec<IssueEntry>,
}

impl Report {
    /// A fresh report dated `today`. Everything else starts empty.
    pub fn blank(today: NaiveDate) -> Self {
        Report {
            date: today.format("%Y-%m-%d").to_string(),
            ..Report::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.site_name.is_empty()
            && self.segment.is_empty()
            && self.category.is_empty()
            && self.time.is_empty()
            && self.weather.is_empty()
            && self.impression.is_empty()
            && self.comments.is_empty()
            && self.company.is_empty()
            && self.people.is_empty()
            && self.roles.is_empty()
            && self.tools.is_empty()
            && self.service.is_empty()
            && self.activities.is_empty()
            && self.issues.is_empty()
    }

    /// Resets `field` to its declared empty value ("" or []).
    pub fn clear_field(&mut self, field: ReportField) {
        match field {
            ReportField::SiteName => self.site_name.clear(),
            ReportField::Segment => self.segment.clear(),
            ReportField::Category => self.category.clear(),
            ReportField::Time => self.time.clear(),
            ReportField::Weather => self.weather.clear(),
            ReportField::Impression => self.impression.clear(),
            ReportField::Comments => self.comments.clear(),
            ReportField::Date => self.date.clear(),
            ReportField::Company => self.company.clear(),
            ReportField::People => self.people.clear(),
            ReportField::Roles => self.roles.clear(),
            ReportField::Tools => self.tools.clear(),
            ReportField::Service => self.service.clear(),
            ReportField::Activities => self.activities.clear(),
            ReportField::Issues => self.issues.clear(),
        }
    }
}

/// Closed enumeration of all report fields. Keeping this closed lets command
/// dispatch be an exhaustive match instead of a runtime-populated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportField {
    SiteName,
    Segment,
    Category,
    Time,
    Weather,
    Impression,
    Comments,
    Date,
    Company,
    People,
    Roles,
    Tools,
    Service,
    Activities,
    Issues,
}

impl ReportField {
    pub const ALL: [ReportField; 15] = [
        ReportField::SiteName,
        ReportField::Segment,
        ReportField::Category,
        ReportField::Time,
        ReportField::Weather,
        ReportField::Impression,
        ReportField::Comments,
        ReportField::Date,
        ReportField::Company,
        ReportField::People,
        ReportField::Roles,
        ReportField::Tools,
        ReportField::Service,
        ReportField::Activities,
        ReportField::Issues,
    ];

    pub fn canonical_name(&self) -> &'static str {
        match self {
            ReportField::SiteName => "site_name",
            ReportField::Segment => "segment",
            ReportField::Category => "category",
            ReportField::Time => "time",
            ReportField::Weather => "weather",
            ReportField::Impression => "impression",
            ReportField::Comments => "comments",
            ReportField::Date => "date",
            ReportField::Company => "company",
            ReportField::People => "people",
            ReportField::Roles => "roles",
            ReportField::Tools => "tools",
            ReportField::Service => "service",
            ReportField::Activities => "activities",
            ReportField::Issues => "issues",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            ReportField::Company
                | ReportField::People
                | ReportField::Roles
                | ReportField::Tools
                | ReportField::Service
                | ReportField::Activities
                | ReportField::Issues
        )
    }

    /// Resolves a user-facing word (singular, plural, or a role-name alias
    /// like "architect") to the canonical field.
    pub fn from_user_word(word: &str) -> Option<ReportField> {
        let key = word.trim().to_lowercase().replace([' ', '-'], "_");
        let field = match key.as_str() {
            "site" | "site_name" | "sitename" | "location" => ReportField::SiteName,
            "segment" | "segments" => ReportField::Segment,
            "category" | "categories" => ReportField::Category,
            "time" | "times" => ReportField::Time,
            "weather" => ReportField::Weather,
            "impression" | "impressions" => ReportField::Impression,
            "comment" | "comments" => ReportField::Comments,
            "date" => ReportField::Date,
            "company" | "companies" | "firm" | "firms" => ReportField::Company,
            "people" | "person" | "worker" | "workers" => ReportField::People,
            "role" | "roles" | "architect" | "engineer" | "supervisor" | "foreman" => {
                ReportField::Roles
            }
            "tool" | "tools" | "equipment" => ReportField::Tools,
            "service" | "services" => ReportField::Service,
            "activity" | "activities" => ReportField::Activities,
            "issue" | "issues" | "problem" | "problems" => ReportField::Issues,
            _ => return None,
        };
        Some(field)
    }

    pub fn parse(word: &str) -> Result<ReportField> {
        Self::from_user_word(word).ok_or_else(|| ReportError::UnknownField(word.to_string()))
    }
}

/// A proposed change to a report, produced by extraction and consumed by the
/// merge engine. `None` means "no change for this field"; `Some` with an
/// empty string/list means "clear this field" -- the two are distinct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ReportDelta {
    #[schemars(description = "Construction site or project name")]
    pub site_name: Option<String>,
    #[schemars(description = "Site segment or section being reported on")]
    pub segment: Option<String>,
    #[schemars(description = "Work category")]
    pub category: Option<String>,
    #[schemars(description = "Time or time range of the observation")]
    pub time: Option<String>,
    #[schemars(description = "Weather on site")]
    pub weather: Option<String>,
    #[schemars(description = "Overall impression of the site")]
    pub impression: Option<String>,
    #[schemars(description = "Free-form remarks that fit no other field")]
    pub comments: Option<String>,
    #[schemars(description = "Report date, YYYY-MM-DD")]
    pub date: Option<String>,

    #[schemars(description = "Companies/contractors present on site")]
    pub company: Option<Vec<CompanyEntry>>,
    #[schemars(description = "Names of people present on site")]
    pub people: Option<Vec<String>>,
    #[schemars(description = "Role bindings: which person holds which role")]
    pub roles: Option<Vec<RoleEntry>>,
    #[schemars(description = "Tools and equipment on site")]
    pub tools: Option<Vec<ToolEntry>>,
    #[schemars(description = "Service tasks performed")]
    pub service: Option<Vec<ServiceEntry>>,
    #[schemars(description = "Activities carried out on site")]
    pub activities: Option<Vec<String>>,
    #[schemars(description = "Problems, delays, faults or injuries observed")]
    pub issues: Option<Vec<IssueEntry>>,
}

impl ReportDelta {
    pub fn is_empty(&self) -> bool {
        self.site_name.is_none()
            && self.segment.is_none()
            && self.category.is_none()
            && self.time.is_none()
            && self.weather.is_none()
            && self.impression.is_none()
            && self.comments.is_none()
            && self.date.is_none()
            && self.company.is_none()
            && self.people.is_none()
            && self.roles.is_none()
            && self.tools.is_none()
            && self.service.is_none()
            && self.activities.is_none()
            && self.issues.is_none()
    }

    /// Names of all fields this delta touches, in declaration order. Used for
    /// the confirmation message after a merge.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        macro_rules! touched {
            ($member:ident, $name:expr) => {
                if self.$member.is_some() {
                    fields.push($name);
                }
            };
        }
        touched!(site_name, "site_name");
        touched!(segment, "segment");
        touched!(category, "category");
        touched!(time, "time");
        touched!(weather, "weather");
        touched!(impression, "impression");
        touched!(comments, "comments");
        touched!(date, "date");
        touched!(company, "company");
        touched!(people, "people");
        touched!(roles, "roles");
        touched!(tools, "tools");
        touched!(service, "service");
        touched!(activities, "activities");
        touched!(issues, "issues");
        fields
    }

    /// Folds a later fragment's delta into this one. Scalars from `other`
    /// overwrite; list values accumulate so that multiple fragments for the
    /// same list field all survive to the merge step.
    pub fn absorb(&mut self, other: ReportDelta) {
        macro_rules! scalar {
            ($member:ident) => {
                if other.$member.is_some() {
                    self.$member = other.$member;
                }
            };
        }
        macro_rules! list {
            ($member:ident) => {
                if let Some(incoming) = other.$member {
                    match self.$member.as_mut() {
                        Some(items) => items.extend(incoming),
                        None => self.$member = Some(incoming),
                    }
                }
            };
        }
        scalar!(site_name);
        scalar!(segment);
        scalar!(category);
        scalar!(time);
        scalar!(weather);
        scalar!(impression);
        scalar!(comments);
        scalar!(date);
        list!(company);
        list!(people);
        list!(roles);
        list!(tools);
        list!(service);
        list!(activities);
        list!(issues);
    }

    /// JSON schema of the delta shape, embedded into the fallback-extraction
    /// prompt so the language model returns data the merge engine accepts.
    pub fn schema_as_json() -> Result<String> {
        let schema = schemars::schema_for!(ReportDelta);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_blank_report_has_only_date() {
        let report = Report::blank(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert!(report.is_empty());
        assert_eq!(report.date, "2024-03-11");
    }

    #[test]
    fn test_clear_field_restores_empty_value() {
        let mut report = Report::default();
        report.tools.push(ToolEntry {
            item: "Crane".into(),
        });
        report.weather = "cloudy".into();

        report.clear_field(ReportField::Tools);
        report.clear_field(ReportField::Weather);
        assert!(report.tools.is_empty());
        assert_eq!(report.weather, "");

        // Clearing twice is idempotent.
        report.clear_field(ReportField::Tools);
        assert!(report.tools.is_empty());
    }

    #[test]
    fn test_field_synonyms() {
        assert_eq!(
            ReportField::from_user_word("architect"),
            Some(ReportField::Roles)
        );
        assert_eq!(
            ReportField::from_user_word("Companies"),
            Some(ReportField::Company)
        );
        assert_eq!(
            ReportField::from_user_word("equipment"),
            Some(ReportField::Tools)
        );
        assert_eq!(ReportField::from_user_word("gibberish"), None);
    }

    #[test]
    fn test_absorb_scalar_overwrites_list_accumulates() {
        let mut first = ReportDelta {
            weather: Some("sunny".into()),
            tools: Some(vec![ToolEntry {
                item: "Crane".into(),
            }]),
            ..ReportDelta::default()
        };
        let second = ReportDelta {
            weather: Some("cloudy".into()),
            tools: Some(vec![ToolEntry {
                item: "Drill".into(),
            }]),
            ..ReportDelta::default()
        };
        first.absorb(second);
        assert_eq!(first.weather.as_deref(), Some("cloudy"));
        assert_eq!(first.tools.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_schema_generation() {
        let schema = ReportDelta::schema_as_json().unwrap();
        assert!(schema.contains("site_name"));
        assert!(schema.contains("caused_by"));
        assert!(schema.contains("activities"));
    }

    #[test]
    fn test_report_roundtrip() {
        let mut report = Report::blank(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        report.issues.push(IssueEntry::new("water leak"));
        let json = serde_json::to_string(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
