//! Dependency resolver (spec.md §4.1): pure, synchronous, side-effect-free.

use mesh_types::TagSelectors;
use semver::{Version, VersionReq};

use crate::model::{Dependency, ProviderCandidate};

/// The outcome of resolving one `Dependency` against the current healthy fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub agent_id: String,
    pub function_name: String,
    pub endpoint: String,
}

/// Resolve `dep` against `candidates` (already filtered to the dependency's
/// `capability` and the owning agent's healthiness, per §4.1 step 1).
///
/// Never fails: a malformed version constraint degrades to "any" (logged),
/// and an empty or fully-excluded candidate set yields `None` (unresolved).
pub fn resolve(dep: &Dependency, candidates: &[ProviderCandidate]) -> Option<ResolvedBinding> {
    let selectors = TagSelectors::parse(&dep.tags);
    let version_req = parse_version_req(dep.version.as_deref());

    let mut survivors: Vec<(&ProviderCandidate, Version, usize)> = candidates
        .iter()
        .filter(|c| c.capability == dep.capability)
        .filter(|c| selectors.is_satisfied_by(&c.tags))
        .filter_map(|c| {
            let version = Version::parse(&c.version).ok()?;
            version_req.matches(&version).then_some((c, version))
        })
        .map(|(c, version)| {
            let score = selectors.preference_score(&c.tags);
            (c, version, score)
        })
        .collect();

    if survivors.is_empty() {
        return None;
    }

    // Tie-break: version descending, then agent_id asc, then function_name asc.
    survivors.sort_by(|(ca, va, sa), (cb, vb, sb)| {
        sb.cmp(sa)
            .then_with(|| vb.cmp(va))
            .then_with(|| ca.agent_id.cmp(&cb.agent_id))
            .then_with(|| ca.function_name.cmp(&cb.function_name))
    });

    let (winner, _, _) = survivors.into_iter().next()?;
    Some(ResolvedBinding {
        agent_id: winner.agent_id.clone(),
        function_name: winner.function_name.clone(),
        endpoint: winner.endpoint.clone(),
    })
}

fn parse_version_req(constraint: Option<&str>) -> VersionReq {
    match constraint {
        None => VersionReq::STAR,
        Some(raw) if raw.trim().is_empty() => VersionReq::STAR,
        Some(raw) => VersionReq::parse(raw).unwrap_or_else(|err| {
            tracing::warn!(constraint = raw, error = %err, "malformed version constraint, treating as unconstrained");
            VersionReq::STAR
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(capability: &str, tags: &[&str], version: Option<&str>) -> Dependency {
        Dependency {
            agent_id: "consumer-1".into(),
            function_name: "consume".into(),
            dep_index: 0,
            capability: capability.into(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            version: version.map(str::to_string),
            namespace: "default".into(),
        }
    }

    fn candidate(agent_id: &str, function_name: &str, tags: &[&str], version: &str) -> ProviderCandidate {
        ProviderCandidate {
            agent_id: agent_id.into(),
            function_name: function_name.into(),
            endpoint: format!("http://{agent_id}"),
            capability: "info".into(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            version: version.into(),
        }
    }

    #[test]
    fn single_consumer_single_provider() {
        let d = dep("date_service", &[], None);
        let providers = vec![ProviderCandidate {
            agent_id: "date-provider-abc123".into(),
            function_name: "get_date".into(),
            endpoint: "http://date-provider".into(),
            capability: "date_service".into(),
            tags: vec![],
            version: "1.0.0".into(),
        }];
        let resolved = resolve(&d, &providers).unwrap();
        assert_eq!(resolved.function_name, "get_date");
        assert_eq!(resolved.agent_id, "date-provider-abc123");
    }

    #[test]
    fn tag_preference_selects_preferred_match() {
        let providers = vec![
            candidate("agent-a", "info_a", &["system", "disk"], "1.0.0"),
            candidate("agent-b", "info_b", &["system", "memory"], "1.0.0"),
        ];

        let prefer_disk = dep("info", &["+disk"], None);
        assert_eq!(resolve(&prefer_disk, &providers).unwrap().agent_id, "agent-a");

        let prefer_memory = dep("info", &["+memory"], None);
        assert_eq!(resolve(&prefer_memory, &providers).unwrap().agent_id, "agent-b");

        let exclude_disk = dep("info", &["-disk"], None);
        assert_eq!(resolve(&exclude_disk, &providers).unwrap().agent_id, "agent-b");

        let impossible = dep("info", &["disk", "-system"], None);
        assert!(resolve(&impossible, &providers).is_none());
    }

    #[test]
    fn exclusion_rejects_candidate_even_with_required_tags_present() {
        let providers = vec![candidate("agent-a", "info_a", &["system", "disk"], "1.0.0")];
        let d = dep("info", &["system", "-disk"], None);
        assert!(resolve(&d, &providers).is_none());
    }

    #[test]
    fn tie_break_is_deterministic() {
        let providers = vec![
            candidate("agent-z", "info_z", &[], "1.0.0"),
            candidate("agent-a", "info_a", &[], "1.0.0"),
        ];
        let d = dep("info", &[], None);
        // Same version, so agent_id ascending wins the tie.
        assert_eq!(resolve(&d, &providers).unwrap().agent_id, "agent-a");
    }

    #[test]
    fn higher_semver_wins_over_lexicographic_tie_break() {
        let providers = vec![
            candidate("agent-a", "info_a", &[], "1.0.0"),
            candidate("agent-a", "info_a", &[], "2.0.0"),
        ];
        let d = dep("info", &[], None);
        assert_eq!(resolve(&d, &providers).unwrap().endpoint, "http://agent-a");
        // both have same endpoint/agent here; check version selection via a distinguishable function name
        let providers = vec![
            ProviderCandidate { agent_id: "agent-a".into(), function_name: "v1".into(), endpoint: "e1".into(), capability: "info".into(), tags: vec![], version: "1.0.0".into() },
            ProviderCandidate { agent_id: "agent-a".into(), function_name: "v2".into(), endpoint: "e2".into(), capability: "info".into(), tags: vec![], version: "2.0.0".into() },
        ];
        assert_eq!(resolve(&d, &providers).unwrap().function_name, "v2");
    }

    #[test]
    fn malformed_version_constraint_degrades_to_any() {
        let providers = vec![candidate("agent-a", "info_a", &[], "1.0.0")];
        let d = dep("info", &[], Some("not-a-constraint"));
        assert!(resolve(&d, &providers).is_some());
    }

    #[test]
    fn no_candidates_for_capability_is_unresolved() {
        let providers = vec![candidate("agent-a", "info_a", &[], "1.0.0")];
        let d = dep("other_capability", &[], None);
        assert!(resolve(&d, &providers).is_none());
    }
}
