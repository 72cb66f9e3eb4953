//! Translators from control-plane output to entities.
//!
//! JSON listings go through serde; `info` and `publish` output is scraped
//! line by line. Nothing here spawns processes, so the external format can be
//! swapped without touching orchestration.

use crate::container::{Container, ContainerStatus, Snapshot};
use crate::image::{Image, ImageKind};
use crate::network::Network;
use crate::ParseError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    config: Option<Map<String, Value>>,
}

impl ListEntry {
    fn config_str(&self, key: &str) -> String {
        self.config
            .as_ref()
            .and_then(|c| c.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    }
}

/// Parse `list --format json` into fresh containers.
pub fn parse_container_list(json: &str) -> Result<Vec<Container>, ParseError> {
    let entries: Vec<ListEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let mut container = Container::new(
                &entry.name,
                &entry.config_str("image.os"),
                &entry.config_str("image.release"),
            );
            container.status = ContainerStatus::from(entry.status.as_str());
            container
        })
        .collect())
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LeaseEntry {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub hwaddr: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub location: String,
}

/// Parse `network list-leases <bridge> --format json`.
pub fn parse_leases(json: &str) -> Result<Vec<LeaseEntry>, ParseError> {
    Ok(serde_json::from_str(json)?)
}

/// Network for the first lease whose hostname is `hostname`; empty if none match.
pub fn network_for(leases: &[LeaseEntry], hostname: &str) -> Network {
    leases
        .iter()
        .find(|l| l.hostname == hostname)
        .map(|lease| Network {
            private_address: lease.address.clone(),
            hardware_address: lease.hwaddr.clone(),
            kind: lease.kind.clone(),
            hostname: lease.hostname.clone(),
            ..Network::default()
        })
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct AliasEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    fingerprint: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    aliases: Option<Vec<AliasEntry>>,
}

/// Parse `image list --format json`. Images are named by their first alias,
/// falling back to the short fingerprint.
pub fn parse_image_list(json: &str) -> Result<Vec<Image>, ParseError> {
    let entries: Vec<ImageEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let name = entry
                .aliases
                .as_ref()
                .and_then(|a| a.first())
                .map_or_else(
                    || entry.fingerprint[..12.min(entry.fingerprint.len())].to_owned(),
                    |a| a.name.clone(),
                );
            let kind = if name.contains("-snap-") {
                ImageKind::Snapshot
            } else {
                ImageKind::Container
            };
            let mut image = Image::new(&name, kind, &entry.fingerprint);
            image.created_at = DateTime::parse_from_rfc3339(&entry.created_at)
                .ok()
                .map(|t| t.with_timezone(&Utc));
            image
        })
        .collect())
}

/// Scrape the `Snapshots:` section of `info <container>` output.
///
/// Handles both the table layout and the older indented list. Only names
/// following the `<container>-snap-<timestamp>` convention are returned,
/// without duplicates.
pub fn parse_snapshots(info: &str, container: &str) -> Vec<Snapshot> {
    let mut found: Vec<Snapshot> = Vec::new();
    let mut in_section = false;

    for line in info.lines() {
        let trimmed = line.trim();
        if !in_section {
            in_section = trimmed.starts_with("Snapshots:");
            continue;
        }
        let indented = line.starts_with([' ', '\t', '|', '+']);
        if !indented && trimmed.ends_with(':') {
            break;
        }
        for word in trimmed.split(|c: char| c.is_whitespace() || c == '|') {
            if let Some(snapshot) = Snapshot::parse_name(container, word) {
                if !found.contains(&snapshot) {
                    found.push(snapshot);
                }
            }
        }
    }
    found
}

/// Recover the content fingerprint from `publish` output.
pub fn parse_fingerprint(output: &str) -> Result<String, ParseError> {
    const MARKER: &str = "fingerprint: ";
    output
        .lines()
        .find_map(|line| {
            line.find(MARKER)
                .map(|idx| line[idx + MARKER.len()..].trim().to_owned())
        })
        .filter(|fp| !fp.is_empty())
        .ok_or_else(|| ParseError::MissingFingerprint(output.trim().to_owned()))
}

/// Guest init state as printed by `systemctl is-system-running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemState {
    Running,
    Degraded,
    Other(String),
}

pub fn parse_system_state(output: &str) -> SystemState {
    match output.trim() {
        "running" => SystemState::Running,
        "degraded" => SystemState::Degraded,
        other => SystemState::Other(other.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_JSON: &str = r#"[
      {"name":"web1","status":"Running","status_code":103,
       "config":{"image.os":"ubuntu","image.release":"jammy","volatile.idmap.base":"0"},
       "state":null},
      {"name":"db1","status":"Stopped","config":null}
    ]"#;

    #[test]
    fn container_list_maps_fields() {
        let containers = parse_container_list(LIST_JSON).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "web1");
        assert_eq!(containers[0].kind, "ubuntu");
        assert_eq!(containers[0].release, "jammy");
        assert_eq!(containers[0].status, ContainerStatus::Running);
        assert_eq!(containers[1].status, ContainerStatus::Stopped);
        assert!(containers[1].kind.is_empty());
    }

    #[test]
    fn malformed_list_is_an_error() {
        assert!(matches!(
            parse_container_list("[{\"name\":"),
            Err(ParseError::Json(_))
        ));
    }

    const LEASES_JSON: &str = r#"[
      {"hostname":"web1","hwaddr":"00:16:3e:aa:bb:01","address":"10.0.3.11","type":"DYNAMIC","location":""},
      {"hostname":"web1","hwaddr":"00:16:3e:aa:bb:01","address":"fd42::11","type":"DYNAMIC","location":""},
      {"hostname":"db1","hwaddr":"00:16:3e:aa:bb:02","address":"10.0.3.12","type":"STATIC","location":""}
    ]"#;

    #[test]
    fn network_uses_first_matching_lease() {
        let leases = parse_leases(LEASES_JSON).unwrap();
        let net = network_for(&leases, "web1");
        assert_eq!(net.private_address, "10.0.3.11");
        assert_eq!(net.hardware_address, "00:16:3e:aa:bb:01");
        assert_eq!(net.kind, "DYNAMIC");
        assert_eq!(net.hostname, "web1");
    }

    #[test]
    fn missing_lease_gives_empty_network() {
        let leases = parse_leases(LEASES_JSON).unwrap();
        assert!(network_for(&leases, "C1").is_empty());
    }

    #[test]
    fn image_list_names_by_alias() {
        let json = r#"[
          {"filename":"a.tar.gz","type":"container","fingerprint":"8f4e0f7d1c2b3a4958677685","created_at":"2021-01-18T10:00:00Z",
           "aliases":[{"name":"web1-image-1a2b","description":""}]},
          {"filename":"b.tar.gz","type":"container","fingerprint":"0123456789abcdef0123","created_at":"bogus","aliases":[]},
          {"fingerprint":"feedfacecafe","aliases":[{"name":"web1-snap-2021-01-18T10HH00MM00SS-UTC-image-9"}]}
        ]"#;
        let images = parse_image_list(json).unwrap();
        assert_eq!(images[0].name, "web1-image-1a2b");
        assert_eq!(images[0].kind, ImageKind::Container);
        assert!(images[0].created_at.is_some());
        assert_eq!(images[1].name, "0123456789ab");
        assert!(images[1].created_at.is_none());
        assert_eq!(images[2].kind, ImageKind::Snapshot);
    }

    const INFO_TABLE: &str = "\
Name: web1
Status: RUNNING
Type: container
Resources:
  Processes: 12
Snapshots:
+---------------------------------------+----------------------+------------+----------+
|                 NAME                  |       TAKEN AT       | EXPIRES AT | STATEFUL |
+---------------------------------------+----------------------+------------+----------+
| web1-snap-2021-01-18T10HH05MM33SS-UTC | 2021/01/18 10:05 UTC |            | NO       |
+---------------------------------------+----------------------+------------+----------+
| manual-backup                         | 2021/01/18 11:00 UTC |            | NO       |
+---------------------------------------+----------------------+------------+----------+
| web1-snap-2021-01-18T10HH05MM33SS-UTC | 2021/01/18 10:05 UTC |            | NO       |
+---------------------------------------+----------------------+------------+----------+
| web1-snap-2021-01-19T08HH00MM00SS-UTC | 2021/01/19 08:00 UTC |            | NO       |
+---------------------------------------+----------------------+------------+----------+
";

    #[test]
    fn snapshot_table_is_deduplicated() {
        let snaps = parse_snapshots(INFO_TABLE, "web1");
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].name, "web1-snap-2021-01-18T10HH05MM33SS-UTC");
        assert_eq!(snaps[1].name, "web1-snap-2021-01-19T08HH00MM00SS-UTC");
    }

    #[test]
    fn snapshot_indented_list_and_section_end() {
        let info = "\
Name: db1
Snapshots:
  db1-snap-2021-01-18T10HH05MM33SS-UTC (taken at 2021/01/18 10:05 UTC) (stateless)
  db1-snap-2021-01-18T10HH05MM33SS-UTC (taken at 2021/01/18 10:05 UTC) (stateless)
Backups:
  db1-snap-2030-01-01T00HH00MM00SS-UTC
";
        let snaps = parse_snapshots(info, "db1");
        assert_eq!(snaps.len(), 1);
    }

    #[test]
    fn no_snapshot_section() {
        assert!(parse_snapshots("Name: web1\nStatus: RUNNING\n", "web1").is_empty());
    }

    #[test]
    fn fingerprint_line_is_scraped() {
        let out = "Publishing instance: Image pack: 100%\nInstance published with fingerprint: 8f4e0f7d1c2b\n";
        assert_eq!(parse_fingerprint(out).unwrap(), "8f4e0f7d1c2b");
    }

    #[test]
    fn fingerprint_missing_is_an_error() {
        assert!(matches!(
            parse_fingerprint("Error: not found"),
            Err(ParseError::MissingFingerprint(_))
        ));
    }

    #[test]
    fn system_state_values() {
        assert_eq!(parse_system_state("running\n"), SystemState::Running);
        assert_eq!(parse_system_state("degraded"), SystemState::Degraded);
        assert_eq!(
            parse_system_state("starting\n"),
            SystemState::Other("starting".to_owned())
        );
    }
}
