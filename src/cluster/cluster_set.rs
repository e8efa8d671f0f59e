use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use log::debug;

use super::{Chain, Cluster, ClusterId, ClusterReason, ClusteringSettings, LinkedPair};
use crate::sample_input::AssemblyLink;
use crate::structural_variant::{Breakend, StructuralVariant, SvId};

/// All clusters of one sample, addressed by cluster id
///
/// Every SV belongs to at most one cluster. Merged-away clusters leave an empty slot so that ids
/// stay stable.
///
#[derive(Default)]
pub struct ClusterSet {
    clusters: Vec<Option<Cluster>>,
    sv_cluster_map: HashMap<SvId, ClusterId>,
}

impl ClusterSet {
    pub fn get(&self, cluster_id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(cluster_id as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, cluster_id: ClusterId) -> Option<&mut Cluster> {
        self.clusters.get_mut(cluster_id as usize)?.as_mut()
    }

    pub fn get_sv_cluster_id(&self, sv_id: SvId) -> Option<ClusterId> {
        self.sv_cluster_map.get(&sv_id).copied()
    }

    pub fn get_sv_cluster_mut(&mut self, sv_id: SvId) -> Option<&mut Cluster> {
        let cluster_id = self.get_sv_cluster_id(sv_id)?;
        self.get_mut(cluster_id)
    }

    /// Iterate over all clusters in id order
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().flatten()
    }

    pub fn clusters_mut(&mut self) -> impl Iterator<Item = &mut Cluster> {
        self.clusters.iter_mut().flatten()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters().count()
    }

    fn assert_unclustered(&self, sv: &StructuralVariant) {
        assert!(
            !self.sv_cluster_map.contains_key(&sv.id),
            "SV {} is already in cluster {}",
            sv.id,
            self.sv_cluster_map[&sv.id]
        );
    }

    pub fn create_cluster(&mut self, sv: &StructuralVariant) -> ClusterId {
        self.assert_unclustered(sv);
        let cluster_id = self.clusters.len() as ClusterId;
        let mut cluster = Cluster::new(cluster_id);
        cluster.add_variant(sv);
        self.clusters.push(Some(cluster));
        self.sv_cluster_map.insert(sv.id, cluster_id);
        cluster_id
    }

    pub fn add_to_cluster(&mut self, cluster_id: ClusterId, sv: &StructuralVariant) {
        self.assert_unclustered(sv);
        let cluster = self
            .get_mut(cluster_id)
            .unwrap_or_else(|| panic!("Missing cluster {cluster_id}"));
        cluster.add_variant(sv);
        self.sv_cluster_map.insert(sv.id, cluster_id);
    }

    /// Merge two clusters, returning the id of the merged cluster
    pub fn merge_clusters(&mut self, cluster_id: ClusterId, other_id: ClusterId) -> ClusterId {
        assert_ne!(cluster_id, other_id, "Cluster {cluster_id} merged with itself");

        let take = |x: &mut Vec<Option<Cluster>>, id: ClusterId| {
            x.get_mut(id as usize)
                .and_then(|x| x.take())
                .unwrap_or_else(|| panic!("Missing cluster {id}"))
        };
        let mut cluster = take(&mut self.clusters, cluster_id);
        let other = take(&mut self.clusters, other_id);

        cluster.merge_other_cluster(other);

        let merged_id = cluster.id();
        for member in cluster.members() {
            self.sv_cluster_map.insert(member.sv_id, merged_id);
        }
        self.clusters[merged_id as usize] = Some(cluster);
        merged_id
    }

    /// Put two SVs in the same cluster, creating, extending or merging clusters as needed
    ///
    /// Returns the id of the cluster holding both SVs.
    ///
    pub fn cluster_pair(
        &mut self,
        sv1: &StructuralVariant,
        sv2: &StructuralVariant,
        reason: ClusterReason,
    ) -> ClusterId {
        let cluster_id = match (
            self.get_sv_cluster_id(sv1.id),
            self.get_sv_cluster_id(sv2.id),
        ) {
            (None, None) => {
                let cluster_id = self.create_cluster(sv1);
                self.add_to_cluster(cluster_id, sv2);
                cluster_id
            }
            (Some(cluster_id), None) => {
                self.add_to_cluster(cluster_id, sv2);
                cluster_id
            }
            (None, Some(cluster_id)) => {
                self.add_to_cluster(cluster_id, sv1);
                cluster_id
            }
            (Some(id1), Some(id2)) => {
                if id1 == id2 {
                    id1
                } else {
                    self.merge_clusters(id1, id2)
                }
            }
        };

        if let Some(cluster) = self.get_mut(cluster_id) {
            cluster.add_cluster_reason(reason);
        }
        cluster_id
    }
}

/// Cluster SVs with any breakends in close proximity
///
/// Consecutive breakends on each chromosome which belong to different SVs are clustered when they
/// are no more than the proximity distance apart.
///
fn cluster_by_proximity(
    cluster_set: &mut ClusterSet,
    svs: &[StructuralVariant],
    sv_index: &HashMap<SvId, usize>,
    proximity_distance: i64,
) {
    let mut chrom_breakends: BTreeMap<&str, Vec<&Breakend>> = BTreeMap::new();
    for sv in svs.iter() {
        for breakend in sv.breakends() {
            chrom_breakends
                .entry(breakend.chromosome.as_str())
                .or_default()
                .push(breakend);
        }
    }

    for breakends in chrom_breakends.values_mut() {
        breakends.sort_by_key(|x| (x.position, x.sv_id, !x.is_start));

        for (prev, next) in breakends.iter().tuple_windows() {
            if prev.sv_id == next.sv_id || next.position - prev.position > proximity_distance {
                continue;
            }
            let sv1 = &svs[sv_index[&prev.sv_id]];
            let sv2 = &svs[sv_index[&next.sv_id]];
            cluster_set.cluster_pair(sv1, sv2, ClusterReason::Proximity);
        }
    }
}

/// Cluster SVs joined by an assembled link, and attach each link as a single-link chain
fn cluster_by_assembly(
    cluster_set: &mut ClusterSet,
    svs: &[StructuralVariant],
    sv_index: &HashMap<SvId, usize>,
    assembly_links: &[AssemblyLink],
) {
    for link in assembly_links.iter() {
        let sv1 = &svs[sv_index[&link.first.sv_id]];
        let sv2 = &svs[sv_index[&link.second.sv_id]];
        let (Some(breakend1), Some(breakend2)) = (
            sv1.breakend(link.first.is_start),
            sv2.breakend(link.second.is_start),
        ) else {
            debug!(
                "Skipping assembly link to a missing breakend between SVs {} and {}",
                sv1.id, sv2.id
            );
            continue;
        };

        let linked_pair = LinkedPair::new(breakend1, breakend2, true);
        let cluster_id = cluster_set.cluster_pair(sv1, sv2, ClusterReason::Assembly);
        if let Some(cluster) = cluster_set.get_mut(cluster_id) {
            cluster.add_assembly_link(linked_pair);
            cluster.add_chain(Chain::from_link(linked_pair));
        }
    }
}

/// Run all clustering passes over the SVs of one sample
///
/// SVs left unclustered by the proximity and assembly passes each get a cluster of their own.
/// Clusters with any SV in a LINE element are then marked as LINE clusters.
///
pub fn build_clusters(
    svs: &[StructuralVariant],
    assembly_links: &[AssemblyLink],
    settings: &ClusteringSettings,
) -> ClusterSet {
    let sv_index = svs
        .iter()
        .enumerate()
        .map(|(i, sv)| (sv.id, i))
        .collect::<HashMap<_, _>>();

    let mut cluster_set = ClusterSet::default();
    cluster_by_proximity(
        &mut cluster_set,
        svs,
        &sv_index,
        settings.proximity_distance,
    );
    cluster_by_assembly(&mut cluster_set, svs, &sv_index, assembly_links);

    for sv in svs.iter() {
        if cluster_set.get_sv_cluster_id(sv.id).is_none() {
            cluster_set.create_cluster(sv);
        }
    }

    for cluster in cluster_set.clusters_mut() {
        if cluster.members().iter().any(|x| x.is_line_element) {
            cluster.mark_as_line();
        }
    }

    debug!(
        "Built {} clusters from {} SVs",
        cluster_set.cluster_count(),
        svs.len()
    );

    cluster_set
}
