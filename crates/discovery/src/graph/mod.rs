//! Co-authorship and topic neighborhood expansion
//!
//! Widens a set of semantically-ranked seed papers through shared
//! authors and shared topics, up to two hops out. Every discovered
//! paper carries a path hint naming how it was reached, so ranked
//! results can explain themselves. Expansion is capped hard: the hint
//! map never exceeds the configured limit, whatever the fan-out of a
//! prolific author or a broad topic.

use async_trait::async_trait;
use expertscope_common::clearance::Clearance;
use expertscope_common::db::{Repository, SharedLinkRow};
use expertscope_common::errors::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Kind of edge that connected two papers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViaType {
    Author,
    Topic,
}

impl ViaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViaType::Author => "author",
            ViaType::Topic => "topic",
        }
    }
}

/// How a discovered paper was reached from a seed
#[derive(Debug, Clone, PartialEq)]
pub struct PathHint {
    pub hop_distance: u8,
    pub via_type: ViaType,
    pub via_label: String,
    pub seed_paper_id: Uuid,
    /// Hop-1 paper the path passed through, for two-hop discoveries
    pub intermediate_paper_id: Option<Uuid>,
}

impl PathHint {
    /// Render the path as a chain from the query node to `paper_id`
    pub fn describe(&self, paper_id: Uuid) -> String {
        match self.intermediate_paper_id {
            Some(intermediate) => format!(
                "query -> seed_paper:{} -> paper:{} -> {}:\"{}\" -> paper:{}",
                self.seed_paper_id,
                intermediate,
                self.via_type.as_str(),
                self.via_label,
                paper_id
            ),
            None => format!(
                "query -> seed_paper:{} -> {}:\"{}\" -> paper:{}",
                self.seed_paper_id,
                self.via_type.as_str(),
                self.via_label,
                paper_id
            ),
        }
    }
}

/// Discovered paper_id -> how it was reached
pub type ExpansionMap = HashMap<Uuid, PathHint>;

/// Source of clearance-filtered shared-author / shared-topic links
#[async_trait]
pub trait NeighborSource: Send + Sync {
    async fn papers_sharing_author(
        &self,
        paper_ids: &[Uuid],
        allowed_levels: &[&str],
    ) -> Result<Vec<SharedLinkRow>>;

    async fn papers_sharing_topic(
        &self,
        paper_ids: &[Uuid],
        allowed_levels: &[&str],
    ) -> Result<Vec<SharedLinkRow>>;
}

#[async_trait]
impl NeighborSource for Repository {
    async fn papers_sharing_author(
        &self,
        paper_ids: &[Uuid],
        allowed_levels: &[&str],
    ) -> Result<Vec<SharedLinkRow>> {
        Repository::papers_sharing_author(self, paper_ids, allowed_levels).await
    }

    async fn papers_sharing_topic(
        &self,
        paper_ids: &[Uuid],
        allowed_levels: &[&str],
    ) -> Result<Vec<SharedLinkRow>> {
        Repository::papers_sharing_topic(self, paper_ids, allowed_levels).await
    }
}

/// Seed-neighborhood walker
#[derive(Clone)]
pub struct GraphExpander {
    source: Arc<dyn NeighborSource>,
    enable_two_hop: bool,
}

impl GraphExpander {
    pub fn new(source: Arc<dyn NeighborSource>, enable_two_hop: bool) -> Self {
        Self {
            source,
            enable_two_hop,
        }
    }

    /// Expand `seeds` (in ranked order) into a capped hint map.
    ///
    /// Author links fold before topic links at each hop, the first hint
    /// recorded for a paper wins, and a shallower hint is never replaced
    /// by a deeper one. Link rows sort by (seed rank, via label,
    /// discovered paper id) before folding, so the outcome is a pure
    /// function of the inputs.
    pub async fn expand(
        &self,
        seeds: &[Uuid],
        clearance: Clearance,
        limit: usize,
    ) -> Result<ExpansionMap> {
        let mut map = ExpansionMap::new();
        if seeds.is_empty() || limit == 0 {
            return Ok(map);
        }

        let allowed = clearance.allowed_levels();
        let seed_set: HashSet<Uuid> = seeds.iter().copied().collect();
        let mut hop1_order: Vec<Uuid> = Vec::new();

        for via_type in [ViaType::Author, ViaType::Topic] {
            if map.len() >= limit {
                return Ok(map);
            }
            let mut links = self.fetch_links(via_type, seeds, allowed).await?;
            sort_links(&mut links, seeds);

            for link in links {
                if map.len() >= limit {
                    return Ok(map);
                }
                let discovered = link.related_paper_id;
                if seed_set.contains(&discovered) || map.contains_key(&discovered) {
                    continue;
                }
                map.insert(
                    discovered,
                    PathHint {
                        hop_distance: 1,
                        via_type,
                        via_label: link.via_label,
                        seed_paper_id: link.seed_paper_id,
                        intermediate_paper_id: None,
                    },
                );
                hop1_order.push(discovered);
            }
        }

        if !self.enable_two_hop || hop1_order.is_empty() {
            return Ok(map);
        }

        // Intermediate -> original seed, resolved before hop 2 can grow
        // the map
        let origin: HashMap<Uuid, Uuid> = hop1_order
            .iter()
            .filter_map(|id| map.get(id).map(|hint| (*id, hint.seed_paper_id)))
            .collect();

        for via_type in [ViaType::Author, ViaType::Topic] {
            if map.len() >= limit {
                return Ok(map);
            }
            let mut links = self.fetch_links(via_type, &hop1_order, allowed).await?;
            sort_links(&mut links, &hop1_order);

            for link in links {
                if map.len() >= limit {
                    return Ok(map);
                }
                let discovered = link.related_paper_id;
                if seed_set.contains(&discovered) || map.contains_key(&discovered) {
                    continue;
                }
                let intermediate = link.seed_paper_id;
                let Some(seed) = origin.get(&intermediate).copied() else {
                    continue;
                };
                map.insert(
                    discovered,
                    PathHint {
                        hop_distance: 2,
                        via_type,
                        via_label: link.via_label,
                        seed_paper_id: seed,
                        intermediate_paper_id: Some(intermediate),
                    },
                );
            }
        }

        Ok(map)
    }

    async fn fetch_links(
        &self,
        via_type: ViaType,
        paper_ids: &[Uuid],
        allowed_levels: &[&str],
    ) -> Result<Vec<SharedLinkRow>> {
        match via_type {
            ViaType::Author => {
                self.source
                    .papers_sharing_author(paper_ids, allowed_levels)
                    .await
            }
            ViaType::Topic => {
                self.source
                    .papers_sharing_topic(paper_ids, allowed_levels)
                    .await
            }
        }
    }
}

/// Order link rows by (position of the source paper in `ranked`,
/// via label, discovered paper id)
fn sort_links(links: &mut [SharedLinkRow], ranked: &[Uuid]) {
    let rank_of: HashMap<Uuid, usize> = ranked
        .iter()
        .enumerate()
        .map(|(rank, id)| (*id, rank))
        .collect();
    let rank = |id: Uuid| rank_of.get(&id).copied().unwrap_or(usize::MAX);

    links.sort_by(|a, b| {
        rank(a.seed_paper_id)
            .cmp(&rank(b.seed_paper_id))
            .then_with(|| a.via_label.cmp(&b.via_label))
            .then(a.related_paper_id.cmp(&b.related_paper_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeNeighbors {
        author_links: Vec<SharedLinkRow>,
        topic_links: Vec<SharedLinkRow>,
    }

    impl FakeNeighbors {
        fn select(pool: &[SharedLinkRow], paper_ids: &[Uuid]) -> Vec<SharedLinkRow> {
            pool.iter()
                .filter(|link| paper_ids.contains(&link.seed_paper_id))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl NeighborSource for FakeNeighbors {
        async fn papers_sharing_author(
            &self,
            paper_ids: &[Uuid],
            _allowed_levels: &[&str],
        ) -> Result<Vec<SharedLinkRow>> {
            Ok(Self::select(&self.author_links, paper_ids))
        }

        async fn papers_sharing_topic(
            &self,
            paper_ids: &[Uuid],
            _allowed_levels: &[&str],
        ) -> Result<Vec<SharedLinkRow>> {
            Ok(Self::select(&self.topic_links, paper_ids))
        }
    }

    fn link(seed: u128, related: u128, label: &str) -> SharedLinkRow {
        SharedLinkRow {
            seed_paper_id: Uuid::from_u128(seed),
            related_paper_id: Uuid::from_u128(related),
            via_label: label.to_string(),
        }
    }

    fn expander(source: FakeNeighbors, two_hop: bool) -> GraphExpander {
        GraphExpander::new(Arc::new(source), two_hop)
    }

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[tokio::test]
    async fn test_author_path_wins_over_topic_path() {
        let source = FakeNeighbors {
            author_links: vec![link(1, 10, "Ada Lovelace")],
            topic_links: vec![link(1, 10, "graph theory")],
        };

        let map = expander(source, false)
            .expand(&[id(1)], Clearance::Public, 25)
            .await
            .unwrap();

        let hint = &map[&id(10)];
        assert_eq!(hint.via_type, ViaType::Author);
        assert_eq!(hint.via_label, "Ada Lovelace");
        assert_eq!(hint.hop_distance, 1);
    }

    #[tokio::test]
    async fn test_first_seed_in_ranked_order_wins() {
        let source = FakeNeighbors {
            author_links: vec![link(2, 10, "Bob"), link(1, 10, "Carol")],
            topic_links: vec![],
        };

        // Seed 2 ranks ahead of seed 1, so its link folds first even
        // though "Carol" sorts before "Bob"
        let map = expander(source, false)
            .expand(&[id(2), id(1)], Clearance::Public, 25)
            .await
            .unwrap();

        assert_eq!(map[&id(10)].seed_paper_id, id(2));
        assert_eq!(map[&id(10)].via_label, "Bob");
    }

    #[tokio::test]
    async fn test_seeds_never_discovered() {
        let source = FakeNeighbors {
            author_links: vec![link(1, 2, "Ada"), link(2, 1, "Ada"), link(1, 10, "Ada")],
            topic_links: vec![],
        };

        let map = expander(source, false)
            .expand(&[id(1), id(2)], Clearance::Public, 25)
            .await
            .unwrap();

        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&id(10)));
    }

    #[tokio::test]
    async fn test_expansion_limit_is_a_hard_cap() {
        let source = FakeNeighbors {
            author_links: vec![
                link(1, 10, "Ada"),
                link(1, 11, "Ada"),
                link(1, 12, "Ada"),
            ],
            topic_links: vec![link(1, 13, "optics")],
        };

        let map = expander(source, false)
            .expand(&[id(1)], Clearance::Public, 2)
            .await
            .unwrap();

        // Rows sort by (seed rank, label, paper id), so 10 and 11 land
        assert_eq!(map.len(), 2);
        assert!(map.contains_key(&id(10)));
        assert!(map.contains_key(&id(11)));
    }

    #[tokio::test]
    async fn test_label_order_breaks_ties_within_a_seed() {
        let source = FakeNeighbors {
            author_links: vec![link(1, 11, "Zoe"), link(1, 10, "Ada")],
            topic_links: vec![],
        };

        let map = expander(source, false)
            .expand(&[id(1)], Clearance::Public, 1)
            .await
            .unwrap();

        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&id(10)));
    }

    #[tokio::test]
    async fn test_two_hop_disabled_stays_at_hop_one() {
        let source = FakeNeighbors {
            author_links: vec![link(1, 10, "Ada"), link(10, 20, "Grace")],
            topic_links: vec![],
        };

        let map = expander(source, false)
            .expand(&[id(1)], Clearance::Public, 25)
            .await
            .unwrap();

        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&id(20)));
    }

    #[tokio::test]
    async fn test_two_hop_points_back_to_original_seed() {
        let source = FakeNeighbors {
            author_links: vec![link(1, 10, "Ada"), link(10, 20, "Grace")],
            topic_links: vec![],
        };

        let map = expander(source, true)
            .expand(&[id(1)], Clearance::Public, 25)
            .await
            .unwrap();

        let hint = &map[&id(20)];
        assert_eq!(hint.hop_distance, 2);
        assert_eq!(hint.seed_paper_id, id(1));
        assert_eq!(hint.intermediate_paper_id, Some(id(10)));
        assert_eq!(hint.via_label, "Grace");
    }

    #[tokio::test]
    async fn test_hop_one_hint_never_replaced_by_hop_two() {
        let source = FakeNeighbors {
            author_links: vec![
                link(1, 10, "Ada"),
                link(1, 20, "Ada"),
                link(10, 20, "Grace"),
            ],
            topic_links: vec![],
        };

        let map = expander(source, true)
            .expand(&[id(1)], Clearance::Public, 25)
            .await
            .unwrap();

        assert_eq!(map[&id(20)].hop_distance, 1);
        assert_eq!(map[&id(20)].via_label, "Ada");
    }

    #[tokio::test]
    async fn test_empty_seeds_and_zero_limit() {
        let source = FakeNeighbors {
            author_links: vec![link(1, 10, "Ada")],
            topic_links: vec![],
        };
        let expander = expander(source, true);

        assert!(expander
            .expand(&[], Clearance::Public, 25)
            .await
            .unwrap()
            .is_empty());
        assert!(expander
            .expand(&[id(1)], Clearance::Public, 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_describe_renders_path_chains() {
        let hop1 = PathHint {
            hop_distance: 1,
            via_type: ViaType::Author,
            via_label: "Ada Lovelace".to_string(),
            seed_paper_id: id(1),
            intermediate_paper_id: None,
        };
        assert_eq!(
            hop1.describe(id(10)),
            format!(
                "query -> seed_paper:{} -> author:\"Ada Lovelace\" -> paper:{}",
                id(1),
                id(10)
            )
        );

        let hop2 = PathHint {
            hop_distance: 2,
            via_type: ViaType::Topic,
            via_label: "optics".to_string(),
            seed_paper_id: id(1),
            intermediate_paper_id: Some(id(10)),
        };
        assert_eq!(
            hop2.describe(id(20)),
            format!(
                "query -> seed_paper:{} -> paper:{} -> topic:\"optics\" -> paper:{}",
                id(1),
                id(10),
                id(20)
            )
        );
    }
}
