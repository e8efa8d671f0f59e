//! Clusters of SVs believed to have arisen from a single mutational event
//!

mod classify;
mod cluster_set;

use std::collections::{BTreeMap, HashSet};

use log::debug;
use serde::Serialize;

pub use self::classify::classify_cluster;
pub use self::cluster_set::{ClusterSet, build_clusters};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::ref_genome_arms::ChromosomeArm;
use crate::structural_variant::{
    Breakend, BreakendId, PloidyRange, StructuralVariant, SvId, SvType,
};

pub type ClusterId = u32;

/// Upper bound on the total SV replication count within one cluster
pub const DEFAULT_CHAINING_SV_LIMIT: u32 = 2000;

/// A cluster is subclonal when more than this fraction of its SVs have low copy number change
/// support
const SUBCLONAL_LOW_CNC_PERCENT: f64 = 0.5;

#[derive(Clone, Debug)]
pub struct ClusteringSettings {
    pub proximity_distance: i64,
    pub chaining_sv_limit: u32,
    pub long_del_dup_length: i64,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            proximity_distance: 5000,
            chaining_sv_limit: DEFAULT_CHAINING_SV_LIMIT,
            long_del_dup_length: 100_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolvedType {
    None,
    Line,
    Del,
    Dup,
    Ins,
    Inv,
    Sgl,
    UnbalancedTranslocation,
    ReciprocalTranslocation,
    ReciprocalInversion,
    Complex,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterReason {
    Proximity,
    Assembly,
}

/// A loss of heterozygosity region bounded by SV breakends
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LohEvent {
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
}

/// Two breakends joined on the same derivative chromosome
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LinkedPair {
    pub first: BreakendId,
    pub second: BreakendId,
    pub is_assembled: bool,

    /// Distance between the two breakends, zero when they are on different chromosomes
    pub length: i64,
}

impl LinkedPair {
    pub fn new(first: &Breakend, second: &Breakend, is_assembled: bool) -> Self {
        let length = if first.chromosome == second.chromosome {
            (first.position - second.position).abs()
        } else {
            0
        };
        Self {
            first: first.id(),
            second: second.id(),
            is_assembled,
            length,
        }
    }

    pub fn has_breakend(&self, breakend: &BreakendId) -> bool {
        self.first == *breakend || self.second == *breakend
    }
}

/// Ordered links tracing one path through a derivative chromosome
#[derive(Clone, Debug, Serialize)]
pub struct Chain {
    pub id: usize,
    pub links: Vec<LinkedPair>,
}

impl Chain {
    pub fn from_link(link: LinkedPair) -> Self {
        Self {
            id: 0,
            links: vec![link],
        }
    }

    pub fn is_fully_assembled(&self) -> bool {
        self.links.iter().all(|x| x.is_assembled)
    }

    pub fn length(&self) -> i64 {
        self.links.iter().map(|x| x.length).sum()
    }

    pub fn sv_ids(&self) -> impl Iterator<Item = SvId> + '_ {
        self.links
            .iter()
            .flat_map(|x| [x.first.sv_id, x.second.sv_id])
    }

    /// The unlinked breakends at either end of the chain
    ///
    /// These are the opposite sides of the first and last linked breakends.
    ///
    pub fn open_breakends(&self) -> Option<(BreakendId, BreakendId)> {
        let first = self.links.first()?.first;
        let last = self.links.last()?.second;
        Some((
            BreakendId {
                sv_id: first.sv_id,
                is_start: !first.is_start,
            },
            BreakendId {
                sv_id: last.sv_id,
                is_start: !last.is_start,
            },
        ))
    }
}

/// SVs of one cluster which share a chromosome arm
#[derive(Clone, Debug, Serialize)]
pub struct ArmGroup {
    pub chromosome: String,
    pub arm: ChromosomeArm,
    pub sv_ids: Vec<SvId>,
}

/// The values of one SV held by its cluster
#[derive(Clone, Debug)]
pub struct ClusterMember {
    pub sv_id: SvId,
    pub sv_type: SvType,
    pub start: Breakend,
    pub end: Option<Breakend>,
    pub implied_ploidy: i32,
    pub ploidy_range: Option<PloidyRange>,
    pub has_low_cn_change_support: bool,
    pub is_line_element: bool,
    consistency: i32,
}

impl ClusterMember {
    pub fn new(sv: &StructuralVariant) -> Self {
        Self {
            sv_id: sv.id,
            sv_type: sv.sv_type,
            start: sv.start.clone(),
            end: sv.end.clone(),
            implied_ploidy: sv.implied_ploidy(),
            ploidy_range: sv.ploidy_range,
            has_low_cn_change_support: sv.has_low_cn_change_support(),
            is_line_element: sv.is_line_element,
            consistency: sv.consistency(),
        }
    }

    pub fn is_sgl(&self) -> bool {
        self.end.is_none()
    }

    pub fn breakend(&self, is_start: bool) -> Option<&Breakend> {
        if is_start {
            Some(&self.start)
        } else {
            self.end.as_ref()
        }
    }

    pub fn breakends(&self) -> impl Iterator<Item = &Breakend> {
        std::iter::once(&self.start).chain(self.end.iter())
    }

    /// Distance between the two breakends, None unless both are on the same chromosome
    pub fn length(&self) -> Option<i64> {
        let end = self.end.as_ref()?;
        if end.chromosome != self.start.chromosome {
            return None;
        }
        Some((end.position - self.start.position).abs())
    }
}

#[derive(Clone, Debug)]
pub struct Cluster {
    id: ClusterId,
    members: Vec<ClusterMember>,
    member_ids: HashSet<SvId>,
    arm_groups: Vec<ArmGroup>,
    consistency_count: i32,

    chains: Vec<Chain>,
    assembly_links: Vec<LinkedPair>,
    loh_events: Vec<LohEvent>,
    cluster_reasons: Vec<ClusterReason>,
    annotations: Vec<String>,

    foldbacks: Vec<SvId>,
    inversions: Vec<SvId>,
    long_del_dups: Vec<SvId>,
    double_minute_svs: Vec<SvId>,

    is_line: bool,
    is_subclonal: bool,
    requires_replication: bool,

    is_resolved: bool,
    resolved_type: ResolvedType,

    /// Length of the event implied by a chained pair of SVs, set when the cluster is resolved as a
    /// synthetic DEL or DUP
    synthetic_length: Option<i64>,

    replication_multiples: BTreeMap<SvId, u32>,
}

impl Cluster {
    pub fn new(id: ClusterId) -> Self {
        Self {
            id,
            members: Vec::new(),
            member_ids: HashSet::new(),
            arm_groups: Vec::new(),
            consistency_count: 0,
            chains: Vec::new(),
            assembly_links: Vec::new(),
            loh_events: Vec::new(),
            cluster_reasons: Vec::new(),
            annotations: Vec::new(),
            foldbacks: Vec::new(),
            inversions: Vec::new(),
            long_del_dups: Vec::new(),
            double_minute_svs: Vec::new(),
            is_line: false,
            is_subclonal: false,
            requires_replication: false,
            is_resolved: false,
            resolved_type: ResolvedType::None,
            synthetic_length: None,
            replication_multiples: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn sv_count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> &[ClusterMember] {
        &self.members
    }

    pub fn contains_sv(&self, sv_id: SvId) -> bool {
        self.member_ids.contains(&sv_id)
    }

    pub fn get_member(&self, sv_id: SvId) -> Option<&ClusterMember> {
        self.members.iter().find(|x| x.sv_id == sv_id)
    }

    pub fn get_breakend(&self, breakend: &BreakendId) -> Option<&Breakend> {
        self.get_member(breakend.sv_id)?.breakend(breakend.is_start)
    }

    pub fn add_variant(&mut self, sv: &StructuralVariant) {
        self.add_member(ClusterMember::new(sv));
    }

    fn add_member(&mut self, member: ClusterMember) {
        assert!(
            self.member_ids.insert(member.sv_id),
            "SV {} added to cluster {} twice",
            member.sv_id,
            self.id
        );

        self.annotations.clear();
        self.double_minute_svs.clear();
        self.replication_multiples.clear();
        self.synthetic_length = None;
        if !self.is_line {
            self.is_resolved = false;
            self.resolved_type = ResolvedType::None;
        }

        self.consistency_count += member.consistency;

        for breakend in member.breakends() {
            match self
                .arm_groups
                .iter_mut()
                .find(|x| x.chromosome == breakend.chromosome && x.arm == breakend.arm)
            {
                Some(arm_group) => {
                    if !arm_group.sv_ids.contains(&member.sv_id) {
                        arm_group.sv_ids.push(member.sv_id);
                    }
                }
                None => {
                    self.arm_groups.push(ArmGroup {
                        chromosome: breakend.chromosome.clone(),
                        arm: breakend.arm,
                        sv_ids: vec![member.sv_id],
                    });
                }
            }
        }

        self.members.push(member);
    }

    /// Absorb all SVs and annotations of another cluster
    ///
    /// If the other cluster has more SVs this cluster takes on its id. Of the other cluster's
    /// chains, only those which are fully assembled are kept.
    ///
    pub fn merge_other_cluster(&mut self, other: Cluster) {
        assert_ne!(self.id, other.id, "Cluster {} merged with itself", self.id);
        assert!(
            (!self.is_resolved && !other.is_resolved) || self.is_line || other.is_line,
            "Merging resolved clusters {} and {}",
            self.id,
            other.id
        );

        if other.sv_count() > self.sv_count() {
            debug!(
                "Cluster {} ({} SVs) merges in cluster {} ({} SVs) and adopts its id",
                self.id,
                self.sv_count(),
                other.id,
                other.sv_count()
            );
            self.id = other.id;
        } else {
            debug!(
                "Cluster {} ({} SVs) merges in cluster {} ({} SVs)",
                self.id,
                self.sv_count(),
                other.id,
                other.sv_count()
            );
        }

        for member in other.members {
            self.add_member(member);
        }

        self.assembly_links.extend(other.assembly_links);
        self.requires_replication |= other.requires_replication;

        for sv_id in other.inversions {
            self.register_inversion(sv_id);
        }
        for sv_id in other.foldbacks {
            self.register_foldback(sv_id);
        }
        for sv_id in other.long_del_dups {
            self.register_long_del_dup(sv_id);
        }
        for loh_event in other.loh_events {
            self.add_loh_event(loh_event);
        }
        for reason in other.cluster_reasons {
            self.add_cluster_reason(reason);
        }

        if other.is_line {
            self.mark_as_line();
        }

        for chain in other.chains.into_iter().filter(|x| x.is_fully_assembled()) {
            self.add_chain(chain);
        }
    }

    pub fn arm_groups(&self) -> &[ArmGroup] {
        &self.arm_groups
    }

    pub fn consistency_count(&self) -> i32 {
        self.consistency_count
    }

    pub fn is_consistent(&self) -> bool {
        self.consistency_count == 0
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn add_chain(&mut self, mut chain: Chain) {
        for sv_id in chain.sv_ids() {
            assert!(
                self.contains_sv(sv_id),
                "Chain includes SV {sv_id} from outside of cluster {}",
                self.id
            );
        }
        chain.id = self.chains.len();
        self.chains.push(chain);
    }

    pub fn assembly_links(&self) -> &[LinkedPair] {
        &self.assembly_links
    }

    pub fn add_assembly_link(&mut self, link: LinkedPair) {
        if !self.assembly_links.contains(&link) {
            self.assembly_links.push(link);
        }
    }

    pub fn loh_events(&self) -> &[LohEvent] {
        &self.loh_events
    }

    pub fn add_loh_event(&mut self, loh_event: LohEvent) {
        if !self.loh_events.contains(&loh_event) {
            self.loh_events.push(loh_event);
        }
    }

    pub fn cluster_reasons(&self) -> &[ClusterReason] {
        &self.cluster_reasons
    }

    pub fn add_cluster_reason(&mut self, reason: ClusterReason) {
        if !self.cluster_reasons.contains(&reason) {
            self.cluster_reasons.push(reason);
        }
    }

    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    pub fn add_annotation(&mut self, annotation: &str) {
        if !self.annotations.iter().any(|x| x == annotation) {
            self.annotations.push(annotation.to_string());
        }
    }

    pub fn foldbacks(&self) -> &[SvId] {
        &self.foldbacks
    }

    pub fn register_foldback(&mut self, sv_id: SvId) {
        if !self.foldbacks.contains(&sv_id) {
            self.foldbacks.push(sv_id);
        }
    }

    pub fn inversions(&self) -> &[SvId] {
        &self.inversions
    }

    pub fn register_inversion(&mut self, sv_id: SvId) {
        if !self.inversions.contains(&sv_id) {
            self.inversions.push(sv_id);
        }
    }

    pub fn long_del_dups(&self) -> &[SvId] {
        &self.long_del_dups
    }

    pub fn register_long_del_dup(&mut self, sv_id: SvId) {
        if !self.long_del_dups.contains(&sv_id) {
            self.long_del_dups.push(sv_id);
        }
    }

    pub fn double_minute_svs(&self) -> &[SvId] {
        &self.double_minute_svs
    }

    pub fn set_double_minute_svs(&mut self, sv_ids: &[SvId]) {
        for &sv_id in sv_ids {
            assert!(self.contains_sv(sv_id));
            if !self.double_minute_svs.contains(&sv_id) {
                self.double_minute_svs.push(sv_id);
            }
        }
    }

    pub fn is_line(&self) -> bool {
        self.is_line
    }

    pub fn mark_as_line(&mut self) {
        self.is_line = true;
        self.set_resolved(true, ResolvedType::Line);
    }

    pub fn is_subclonal(&self) -> bool {
        self.is_subclonal
    }

    pub fn mark_subclonal(&mut self) {
        if self.members.is_empty() {
            return;
        }
        let low_cnc_count = self
            .members
            .iter()
            .filter(|x| x.has_low_cn_change_support)
            .count();
        self.is_subclonal =
            low_cnc_count as f64 / self.members.len() as f64 > SUBCLONAL_LOW_CNC_PERCENT;
    }

    pub fn is_resolved(&self) -> bool {
        self.is_resolved
    }

    pub fn resolved_type(&self) -> ResolvedType {
        self.resolved_type
    }

    pub fn set_resolved(&mut self, is_resolved: bool, resolved_type: ResolvedType) {
        self.is_resolved = is_resolved;
        self.resolved_type = resolved_type;
    }

    pub fn synthetic_length(&self) -> Option<i64> {
        self.synthetic_length
    }

    pub fn set_synthetic_length(&mut self, length: i64) {
        self.synthetic_length = Some(length);
    }

    pub fn requires_replication(&self) -> bool {
        self.requires_replication
    }

    pub fn set_requires_replication(&mut self) {
        self.requires_replication = true;
    }

    pub fn replication_multiples(&self) -> &BTreeMap<SvId, u32> {
        &self.replication_multiples
    }

    /// Replication multiple of one SV, 1 unless replication has been applied
    pub fn replication_multiple(&self, sv_id: SvId) -> u32 {
        self.replication_multiples.get(&sv_id).copied().unwrap_or(1)
    }

    /// Highest count of assembled links attached to any one breakend of the SV
    fn max_assembled_multiple(&self, member: &ClusterMember) -> u32 {
        member
            .breakends()
            .map(|breakend| {
                let id = breakend.id();
                self.assembly_links
                    .iter()
                    .filter(|x| x.has_breakend(&id))
                    .count() as u32
            })
            .max()
            .unwrap_or(0)
    }

    /// Minimum and maximum ploidy of the cluster SVs
    ///
    /// Where calculated ploidy ranges are available, these are used to find a common integer
    /// ploidy shared by all SVs, or otherwise the narrowest set of integer ploidy levels covering
    /// them.
    ///
    pub fn min_max_ploidy(&self) -> (f64, f64) {
        if self.members.len() == 1 {
            let ploidy = self.members[0].implied_ploidy as f64;
            return (ploidy, ploidy);
        }

        let mut min_ploidy = -1.0;
        let mut max_ploidy = 0.0;

        let mut sv_calc_ploidy_count = 0;
        let mut ploidy_frequency = BTreeMap::new();
        let mut tightest_min_ploidy = 0.0;
        let mut tightest_max_ploidy = -1.0;
        let mut count_half_to_one_ploidy = 0;
        let mut min_sv_ploidy = -1.0;
        let mut max_assembled_multiple = 1;

        for member in self.members.iter() {
            let sv_ploidy = member.implied_ploidy as f64;
            max_assembled_multiple = max_assembled_multiple.max(self.max_assembled_multiple(member));

            if min_ploidy < 0.0 || sv_ploidy < min_ploidy {
                min_ploidy = sv_ploidy;
                min_sv_ploidy = sv_ploidy;
            }
            max_ploidy = f64::max(max_ploidy, sv_ploidy);

            if let Some(range) = member.ploidy_range {
                sv_calc_ploidy_count += 1;

                let min_ploidy_int = range.min.ceil() as i32;
                let max_ploidy_int = (range.max.floor() as i32).max(min_ploidy_int);

                if tightest_max_ploidy == -1.0 || range.max < tightest_max_ploidy {
                    tightest_max_ploidy = range.max;
                }
                tightest_min_ploidy = f64::max(range.min, tightest_min_ploidy);

                if range.min < 1.0 && range.max > 0.5 {
                    count_half_to_one_ploidy += 1;
                }

                for ploidy in min_ploidy_int..=max_ploidy_int {
                    *ploidy_frequency.entry(ploidy).or_insert(0) += 1;
                }
            }
        }

        if sv_calc_ploidy_count > 0 {
            min_ploidy = -1.0;
            max_ploidy = 0.0;

            for (&ploidy, &sv_count) in ploidy_frequency.iter() {
                let ploidy = ploidy as f64;
                if sv_count == sv_calc_ploidy_count {
                    // All SVs can settle on the same ploidy
                    min_ploidy = ploidy;
                    max_ploidy = ploidy;
                    break;
                }

                if ploidy > 0.0 && (min_ploidy < 0.0 || ploidy < min_ploidy) {
                    min_ploidy = ploidy;
                }
                min_ploidy = f64::max(min_ploidy, min_sv_ploidy);
                max_ploidy = f64::max(max_ploidy, ploidy);
            }

            if min_ploidy < max_ploidy && max_assembled_multiple == 1 {
                let common_non_integer_range = tightest_max_ploidy > tightest_min_ploidy
                    && tightest_max_ploidy - tightest_min_ploidy < 1.0;
                if common_non_integer_range || count_half_to_one_ploidy == sv_calc_ploidy_count {
                    min_ploidy = 1.0;
                    max_ploidy = 1.0;
                }
            }
        }

        if max_assembled_multiple > 1 {
            max_ploidy = f64::max(max_ploidy, max_assembled_multiple as f64 * min_ploidy);
        }

        (min_ploidy, max_ploidy)
    }

    pub fn has_varied_ploidy(&self) -> bool {
        if self.members.len() <= 1 {
            return false;
        }
        let (min_ploidy, max_ploidy) = self.min_max_ploidy();
        max_ploidy > min_ploidy && min_ploidy >= 0.0
    }

    /// Set the number of times each SV should be replicated for chaining, in proportion to its
    /// ploidy relative to the cluster minimum
    ///
    /// The total replication count is capped by the chaining limit, scaling down all multiples
    /// when needed. Each SV keeps at least one copy, so a cluster with more SVs than the cap
    /// ends up with every multiple at 1.
    ///
    pub fn set_ploidy_replication(&mut self, chaining_sv_limit: u32, diagnostics: &mut Diagnostics) {
        self.replication_multiples = self.members.iter().map(|x| (x.sv_id, 1)).collect();

        if !self.has_varied_ploidy() && !self.requires_replication {
            return;
        }

        let (min_ploidy, max_ploidy) = self.min_max_ploidy();
        if min_ploidy <= 0.0 {
            diagnostics.push(Diagnostic::InvalidClusterPloidy {
                cluster_id: self.id,
                min_ploidy,
                max_ploidy,
            });
            return;
        }

        let mut multiples = self
            .members
            .iter()
            .map(|member| {
                let multiple = ((member.implied_ploidy as f64 / min_ploidy).round() as u32).max(1);
                let assembled_multiple = self.max_assembled_multiple(member);
                (member.sv_id, multiple.max(assembled_multiple))
            })
            .collect::<BTreeMap<_, _>>();

        let replication_cap = if chaining_sv_limit > 0 {
            chaining_sv_limit.min(DEFAULT_CHAINING_SV_LIMIT)
        } else {
            DEFAULT_CHAINING_SV_LIMIT
        };
        let total_replication_count = multiples.values().sum::<u32>();
        if total_replication_count > replication_cap {
            diagnostics.push(Diagnostic::ReplicationScaled {
                cluster_id: self.id,
                total_replication_count,
                replication_cap,
            });
            // Every SV keeps one copy, so only the copies above one are scaled into the room
            // left under the cap
            let sv_count = multiples.len() as u64;
            let cap = replication_cap as u64;
            let total = total_replication_count as u64;
            for multiple in multiples.values_mut() {
                *multiple = if sv_count <= cap {
                    1 + ((*multiple as u64 - 1) * (cap - sv_count) / (total - sv_count)) as u32
                } else {
                    1
                };
            }
        }

        for (&sv_id, &multiple) in multiples.iter() {
            if multiple > 1 {
                debug!(
                    "Cluster {} SV {sv_id} ploidy multiple {multiple} vs cluster min ploidy {min_ploidy}",
                    self.id
                );
                self.set_requires_replication();
            }
        }
        self.replication_multiples = multiples;
    }
}
