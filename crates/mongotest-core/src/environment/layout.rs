//! Process layouts for each topology
//!
//! A layout is plain data: which processes to launch, on which ports, and how
//! they are tied together. The process manager consumes it; tests inspect it.

use super::TopologyKind;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Which server binary a group runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binary {
    Mongod,
    Mongos,
}

/// Launch options for one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSpec {
    pub port: u16,
    /// Data directory; routers have none
    pub dbpath: Option<PathBuf>,
    pub arbiter: bool,
    pub priority: Option<u32>,
    pub tags: BTreeMap<String, String>,
    /// Explicit `--enableMajorityReadConcern` value, omitted when `None`
    pub enable_majority_read_concern: Option<bool>,
}

impl MemberSpec {
    fn data(port: u16, dbpath: PathBuf) -> Self {
        Self {
            port,
            dbpath: Some(dbpath),
            arbiter: false,
            priority: None,
            tags: BTreeMap::new(),
            enable_majority_read_concern: None,
        }
    }

    fn router(port: u16) -> Self {
        Self {
            port,
            dbpath: None,
            arbiter: false,
            priority: None,
            tags: BTreeMap::new(),
            enable_majority_read_concern: None,
        }
    }

    fn arbiter(mut self) -> Self {
        self.arbiter = true;
        self
    }

    fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }
}

/// How the members of a group relate to each other
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRole {
    Standalone { auth: bool },
    ReplicaSet { name: String },
    Shard { name: String },
    ConfigServers { name: String },
    Routers { configdb: String },
}

/// A set of processes launched and wired together as a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGroup {
    pub role: GroupRole,
    pub members: Vec<MemberSpec>,
}

impl ProcessGroup {
    pub fn binary(&self) -> Binary {
        match self.role {
            GroupRole::Routers { .. } => Binary::Mongos,
            _ => Binary::Mongod,
        }
    }

    /// Replica set name, if this group forms one
    pub fn set_name(&self) -> Option<&str> {
        match &self.role {
            GroupRole::ReplicaSet { name }
            | GroupRole::Shard { name }
            | GroupRole::ConfigServers { name } => Some(name),
            _ => None,
        }
    }

    /// Command-line arguments for one member of this group
    pub fn launch_args(&self, member: &MemberSpec, host: &str) -> Vec<String> {
        let mut args = vec![
            "--port".to_string(),
            member.port.to_string(),
            "--bind_ip".to_string(),
            host.to_string(),
        ];

        if let Some(dbpath) = &member.dbpath {
            args.push("--dbpath".to_string());
            args.push(dbpath.display().to_string());
        }

        match &self.role {
            GroupRole::Standalone { auth } => {
                if *auth {
                    args.push("--auth".to_string());
                }
            }
            GroupRole::ReplicaSet { name } => {
                args.extend(["--replSet".to_string(), name.clone()]);
            }
            GroupRole::Shard { name } => {
                args.extend(["--replSet".to_string(), name.clone(), "--shardsvr".to_string()]);
            }
            GroupRole::ConfigServers { name } => {
                args.extend(["--replSet".to_string(), name.clone(), "--configsvr".to_string()]);
            }
            GroupRole::Routers { configdb } => {
                args.extend(["--configdb".to_string(), configdb.clone()]);
            }
        }

        if let Some(enabled) = member.enable_majority_read_concern {
            args.push(format!("--enableMajorityReadConcern={}", enabled));
        }

        args
    }

    /// `replSetInitiate` document for replica-set groups
    pub fn initiate_command(&self, host: &str) -> Option<Value> {
        let name = self.set_name()?;
        let members: Vec<Value> = self
            .members
            .iter()
            .enumerate()
            .map(|(id, member)| {
                let mut doc = Map::new();
                doc.insert("_id".to_string(), json!(id));
                doc.insert("host".to_string(), json!(format!("{}:{}", host, member.port)));
                if member.arbiter {
                    doc.insert("arbiterOnly".to_string(), json!(true));
                }
                if let Some(priority) = member.priority {
                    doc.insert("priority".to_string(), json!(priority));
                }
                if !member.tags.is_empty() {
                    doc.insert("tags".to_string(), json!(member.tags));
                }
                Value::Object(doc)
            })
            .collect();

        let mut config = json!({ "_id": name, "members": members });
        if matches!(self.role, GroupRole::ConfigServers { .. }) {
            config["configsvr"] = json!(true);
        }
        Some(json!({ "replSetInitiate": config }))
    }

    /// `addShard` document registering this group with a router
    pub fn add_shard_command(&self, host: &str) -> Option<Value> {
        let GroupRole::Shard { name } = &self.role else {
            return None;
        };
        let seeds: Vec<String> = self
            .members
            .iter()
            .filter(|m| !m.arbiter)
            .map(|m| format!("{}:{}", host, m.port))
            .collect();
        Some(json!({ "addShard": format!("{}/{}", name, seeds.join(",")) }))
    }
}

/// Every process group of a topology, in launch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyLayout {
    pub groups: Vec<ProcessGroup>,
}

impl TopologyLayout {
    /// Standard layout for `kind`, with data directories under `data_dir`
    pub fn for_kind(kind: TopologyKind, host: &str, data_dir: &Path) -> Self {
        let member = |port: u16| MemberSpec::data(port, data_dir.join(port.to_string()));

        let groups = match kind {
            TopologyKind::Standalone | TopologyKind::Authenticated => vec![ProcessGroup {
                role: GroupRole::Standalone {
                    auth: kind == TopologyKind::Authenticated,
                },
                members: vec![MemberSpec::data(27017, data_dir.join("data-27017"))],
            }],
            TopologyKind::ReplicaSet => {
                let mut members = vec![
                    member(31000).tag("loc", "ny"),
                    member(31001).tag("loc", "sf"),
                    member(31002).tag("loc", "sf").priority(0),
                    member(31003).tag("loc", "sf"),
                    member(31004).arbiter(),
                ];
                for m in &mut members {
                    m.enable_majority_read_concern = Some(true);
                }
                vec![ProcessGroup {
                    role: GroupRole::ReplicaSet {
                        name: "rs".to_string(),
                    },
                    members,
                }]
            }
            TopologyKind::Sharded => {
                let config_ports = [35000u16, 35001, 35002];
                let configdb = format!(
                    "rs3/{}",
                    config_ports
                        .iter()
                        .map(|p| format!("{}:{}", host, p))
                        .collect::<Vec<_>>()
                        .join(",")
                );
                vec![
                    ProcessGroup {
                        role: GroupRole::Shard {
                            name: "rs1".to_string(),
                        },
                        members: vec![member(31000), member(31001), member(31002).arbiter()],
                    },
                    ProcessGroup {
                        role: GroupRole::Shard {
                            name: "rs2".to_string(),
                        },
                        members: vec![member(31010), member(31011), member(31012).arbiter()],
                    },
                    ProcessGroup {
                        role: GroupRole::ConfigServers {
                            name: "rs3".to_string(),
                        },
                        members: config_ports.iter().map(|p| member(*p)).collect(),
                    },
                    ProcessGroup {
                        role: GroupRole::Routers { configdb },
                        members: vec![MemberSpec::router(51000), MemberSpec::router(51001)],
                    },
                ]
            }
        };

        Self { groups }
    }

    /// Port clients connect to: the first router, else the first member
    pub fn entry_port(&self) -> Option<u16> {
        self.groups
            .iter()
            .find(|g| g.binary() == Binary::Mongos)
            .or_else(|| self.groups.first())
            .and_then(|g| g.members.first())
            .map(|m| m.port)
    }

    pub fn members(&self) -> impl Iterator<Item = &MemberSpec> {
        self.groups.iter().flat_map(|g| g.members.iter())
    }

    pub fn members_mut(&mut self) -> impl Iterator<Item = &mut MemberSpec> {
        self.groups.iter_mut().flat_map(|g| g.members.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layout(kind: TopologyKind) -> TopologyLayout {
        TopologyLayout::for_kind(kind, "localhost", Path::new("/tmp/db"))
    }

    #[test]
    fn test_standalone_layout() {
        let layout = layout(TopologyKind::Standalone);
        assert_eq!(layout.entry_port(), Some(27017));
        let group = &layout.groups[0];
        assert_eq!(
            group.launch_args(&group.members[0], "localhost"),
            vec![
                "--port",
                "27017",
                "--bind_ip",
                "localhost",
                "--dbpath",
                "/tmp/db/data-27017"
            ]
        );
    }

    #[test]
    fn test_auth_layout_enables_auth() {
        let layout = layout(TopologyKind::Authenticated);
        let group = &layout.groups[0];
        assert!(group
            .launch_args(&group.members[0], "localhost")
            .contains(&"--auth".to_string()));
    }

    #[test]
    fn test_replica_set_layout() {
        let layout = layout(TopologyKind::ReplicaSet);
        assert_eq!(layout.members().count(), 5);
        assert_eq!(layout.entry_port(), Some(31000));

        let group = &layout.groups[0];
        let args = group.launch_args(&group.members[0], "localhost");
        assert!(args.contains(&"--replSet".to_string()));
        assert!(args.contains(&"--enableMajorityReadConcern=true".to_string()));

        let initiate = group.initiate_command("localhost").unwrap();
        let members = initiate["replSetInitiate"]["members"].as_array().unwrap();
        assert_eq!(initiate["replSetInitiate"]["_id"], "rs");
        assert_eq!(members.len(), 5);
        assert_eq!(members[0]["tags"]["loc"], "ny");
        assert_eq!(members[2]["priority"], 0);
        assert_eq!(members[4]["arbiterOnly"], true);
        assert_eq!(members[4]["host"], "localhost:31004");
    }

    #[test]
    fn test_sharded_layout() {
        let layout = layout(TopologyKind::Sharded);
        assert_eq!(layout.groups.len(), 4);
        assert_eq!(layout.entry_port(), Some(51000));

        let shard = &layout.groups[0];
        assert_eq!(
            shard.add_shard_command("localhost").unwrap(),
            json!({ "addShard": "rs1/localhost:31000,localhost:31001" })
        );

        let config = &layout.groups[2];
        assert_eq!(
            config.initiate_command("localhost").unwrap()["replSetInitiate"]["configsvr"],
            true
        );

        let routers = &layout.groups[3];
        assert_eq!(routers.binary(), Binary::Mongos);
        assert!(routers.initiate_command("localhost").is_none());
        let args = routers.launch_args(&routers.members[0], "localhost");
        assert!(args.contains(&"rs3/localhost:35000,localhost:35001,localhost:35002".to_string()));
        assert!(!args.contains(&"--dbpath".to_string()));
    }
}
