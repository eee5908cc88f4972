use super::{ProcessGroup, Protocol};

/// Search text and protocol restriction applied to a snapshot's groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessFilter {
    pub query: Option<String>,
    pub protocol: Option<Protocol>,
}

impl ProcessFilter {
    pub fn new(query: Option<String>, protocol: Option<Protocol>) -> Self {
        let query = query
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        Self { query, protocol }
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_none() && self.protocol.is_none()
    }

    /// A group matches when the query hits its name, command or any port number,
    /// and at least one of its ports uses the selected protocol.
    pub fn matches(&self, group: &ProcessGroup) -> bool {
        let query_matches = match &self.query {
            None => true,
            Some(query) => {
                let query = query.to_lowercase();
                group.process_name.to_lowercase().contains(query.as_str())
                    || group.command.to_lowercase().contains(query.as_str())
                    || group
                        .ports
                        .iter()
                        .any(|p| p.port.to_string().contains(query.as_str()))
            }
        };

        let protocol_matches = match self.protocol {
            None => true,
            Some(protocol) => group.ports.iter().any(|p| p.protocol == protocol),
        };

        query_matches && protocol_matches
    }

    /// Keeps matching groups in their original order.
    pub fn apply<'a>(&self, groups: &'a [ProcessGroup]) -> Vec<&'a ProcessGroup> {
        groups.iter().filter(|g| self.matches(g)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::PortRecord;

    fn group(name: &str, command: &str, ports: &[(u16, Protocol)]) -> ProcessGroup {
        ProcessGroup {
            process_name: name.to_string(),
            pid: 500,
            command: command.to_string(),
            ports: ports
                .iter()
                .map(|&(port, protocol)| PortRecord {
                    port,
                    protocol,
                    process_name: name.to_string(),
                    pid: 500,
                    command: command.to_string(),
                    state: None,
                })
                .collect(),
            order_index: 0,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = ProcessFilter::new(Some("   ".to_string()), None);
        assert!(filter.is_empty());
        assert!(filter.matches(&group("x", "x", &[])));
    }

    #[test]
    fn query_matches_name_command_and_port() {
        let g = group("Chrome", r"Google\x20Chrome", &[(9222, Protocol::Tcp)]);
        assert!(ProcessFilter::new(Some("chr".into()), None).matches(&g));
        assert!(ProcessFilter::new(Some("GOOGLE".into()), None).matches(&g));
        assert!(ProcessFilter::new(Some("922".into()), None).matches(&g));
        assert!(!ProcessFilter::new(Some("firefox".into()), None).matches(&g));
    }

    #[test]
    fn protocol_restriction() {
        let tcp_only = group("nginx", "nginx", &[(80, Protocol::Tcp)]);
        let mixed = group("mdns", "mdns", &[(53, Protocol::Tcp), (5353, Protocol::Udp)]);
        let filter = ProcessFilter::new(None, Some(Protocol::Udp));
        let groups = vec![tcp_only, mixed];
        let matched = filter.apply(&groups);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].process_name, "mdns");
    }
}
