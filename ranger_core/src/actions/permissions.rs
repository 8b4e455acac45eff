//! Read-only capability report for the configured site account.

use crate::actions::config::ShowPermissionsConfig;
use crate::actions::credentials::{connection_params, site_endpoints, stored_auth_mode};
use crate::models::Integration;
use crate::site::{EventType, SiteClient, SiteConnector, SiteError, Subject, SubjectGroup};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

/// Permission keys reported regardless of event category.
pub const GLOBAL_PERMISSION_KEYS: [&str; 5] =
    ["message", "event", "observation", "eventtype", "eventcategory"];

pub const REPORT_WIDGET: &str = "DynamicJSONCard";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiHint {
    pub widget: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryPermissions {
    pub event_types: Vec<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionSummary {
    #[serde(rename = "Global Permissions")]
    pub global: BTreeMap<String, Vec<String>>,
    #[serde(rename = "Event Categories")]
    pub event_categories: BTreeMap<String, CategoryPermissions>,
    #[serde(rename = "Subject Groups")]
    pub subject_groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsReport {
    pub ui: UiHint,
    pub data: PermissionSummary,
}

#[tracing::instrument(level = "info", skip_all, fields(integration_id = %integration.id))]
pub async fn show_permissions(
    connector: &dyn SiteConnector,
    integration: &Integration,
    config: &ShowPermissionsConfig,
    connect_timeout: Duration,
) -> Result<PermissionsReport> {
    let mode = stored_auth_mode(integration)?;
    let endpoints = site_endpoints(&integration.base_url)?;

    let client = connector
        .connect(connection_params(endpoints, &mode, connect_timeout))
        .await?;
    let summary = collect(client.as_ref(), config).await;
    client.close().await;

    Ok(PermissionsReport {
        ui: UiHint {
            widget: REPORT_WIDGET.to_string(),
        },
        data: summary?,
    })
}

async fn collect(
    client: &dyn SiteClient,
    config: &ShowPermissionsConfig,
) -> std::result::Result<PermissionSummary, SiteError> {
    let me = client.get_me().await?;
    let event_types = client.get_event_types().await?;
    let groups = match client.get_subjectgroups(false).await {
        Ok(groups) => groups,
        Err(e) if e.is_permission_denied() => {
            tracing::warn!(error = %e, "no access to subject groups; reporting none");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    Ok(PermissionSummary {
        global: global_permissions(&me.permissions),
        event_categories: category_permissions(&me.permissions, &event_types),
        subject_groups: subject_groups(
            &groups,
            config.include_subjects_from_subgroups_in_parent,
        ),
    })
}

fn sorted_unique<'a>(items: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    items
        .into_iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn global_permissions(
    granted: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, Vec<String>> {
    GLOBAL_PERMISSION_KEYS
        .iter()
        .filter_map(|key| {
            let actions = granted.get(*key).filter(|a| !a.is_empty())?;
            Some((key.to_string(), sorted_unique(actions)))
        })
        .collect()
}

/// Categories the caller holds at least one grant on, keyed by display name.
pub fn category_permissions(
    granted: &BTreeMap<String, Vec<String>>,
    event_types: &[EventType],
) -> BTreeMap<String, CategoryPermissions> {
    let mut by_category: BTreeMap<&str, (&str, Vec<&EventType>)> = BTreeMap::new();
    for event_type in event_types {
        let category = &event_type.category;
        let label = if category.display.is_empty() {
            category.value.as_str()
        } else {
            category.display.as_str()
        };
        by_category
            .entry(category.value.as_str())
            .or_insert_with(|| (label, Vec::new()))
            .1
            .push(event_type);
    }

    let mut out = BTreeMap::new();
    for (value, (label, types)) in by_category {
        let Some(actions) = granted.get(value).filter(|a| !a.is_empty()) else {
            continue;
        };
        let names = types.iter().map(|t| {
            if t.display.is_empty() {
                &t.value
            } else {
                &t.display
            }
        });
        out.insert(
            label.to_string(),
            CategoryPermissions {
                event_types: sorted_unique(names),
                permissions: sorted_unique(actions),
            },
        );
    }
    out
}

/// One entry per group in the tree, each listing subject names.
///
/// With `recursive`, a group also lists every subject of its descendants,
/// de-duplicated by subject id and sorted by name.
pub fn subject_groups(groups: &[SubjectGroup], recursive: bool) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut seen = HashSet::new();
    let mut pending: Vec<&SubjectGroup> = groups.iter().rev().collect();
    while let Some(group) = pending.pop() {
        if !seen.insert(group.id.as_str()) {
            continue;
        }
        let subjects = if recursive {
            let mut visited = HashSet::new();
            let mut members = BTreeMap::new();
            gather_subjects(group, &mut visited, &mut members);
            subject_names(members.into_values())
        } else {
            subject_names(group.subjects.iter())
        };
        let entry = out.entry(group.name.clone()).or_default();
        entry.extend(subjects);
        entry.sort();
        pending.extend(group.subgroups.iter().rev());
    }
    out
}

fn gather_subjects<'a>(
    group: &'a SubjectGroup,
    visited: &mut HashSet<&'a str>,
    members: &mut BTreeMap<&'a str, &'a Subject>,
) {
    if !visited.insert(group.id.as_str()) {
        tracing::warn!(group_id = %group.id, name = %group.name, "subject group cycle detected");
        return;
    }
    for subject in &group.subjects {
        members.entry(subject.id.as_str()).or_insert(subject);
    }
    for child in &group.subgroups {
        gather_subjects(child, visited, members);
    }
}

fn subject_names<'a>(subjects: impl Iterator<Item = &'a Subject>) -> Vec<String> {
    let mut names: Vec<String> = subjects.map(|s| s.name.clone()).collect();
    names.sort();
    names
}
