use log::debug;

use super::{Cluster, ClusteringSettings, ResolvedType};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::structural_variant::SvType;

fn get_single_sv_resolved_type(sv_type: SvType) -> ResolvedType {
    match sv_type {
        SvType::Del => ResolvedType::Del,
        SvType::Dup => ResolvedType::Dup,
        SvType::Ins => ResolvedType::Ins,
        SvType::Inv => ResolvedType::Inv,
        SvType::Sgl => ResolvedType::Sgl,
        SvType::Bnd => ResolvedType::UnbalancedTranslocation,
    }
}

/// Resolve a 2-SV cluster forming one fully assembled chain as a synthetic DEL or DUP
///
/// The open breakends of the chain must be on the same chromosome arm and face in opposite
/// directions. The synthetic event is only considered resolved when it is shorter than the long
/// DEL/DUP length.
///
fn classify_synthetic_del_dup(cluster: &mut Cluster, long_del_dup_length: i64) -> bool {
    if cluster.chains().len() != 1 || cluster.members().iter().any(|x| x.is_sgl()) {
        return false;
    }
    let chain = &cluster.chains()[0];
    if !chain.is_fully_assembled() {
        return false;
    }

    let Some((start_id, end_id)) = chain.open_breakends() else {
        return false;
    };
    let (Some(chain_start), Some(chain_end)) =
        (cluster.get_breakend(&start_id), cluster.get_breakend(&end_id))
    else {
        return false;
    };

    if chain_start.chromosome != chain_end.chromosome
        || chain_start.arm != chain_end.arm
        || chain_start.orientation == chain_end.orientation
    {
        return false;
    }

    let face_away = (chain_start.position < chain_end.position) == (chain_start.orientation == 1);
    let synthetic_length = (chain_start.position - chain_end.position).abs();
    let resolved_type = if face_away {
        ResolvedType::Del
    } else {
        ResolvedType::Dup
    };

    debug!(
        "Cluster {} chain with {} links, length {} and synthetic length {synthetic_length} marked as {resolved_type}",
        cluster.id(),
        chain.links.len(),
        chain.length()
    );

    cluster.set_resolved(synthetic_length < long_del_dup_length, resolved_type);
    cluster.set_synthetic_length(synthetic_length);
    true
}

fn classify_reciprocal_pair(cluster: &mut Cluster) -> bool {
    let [sv1, sv2] = cluster.members() else {
        return false;
    };
    let (Some(end1), Some(end2)) = (&sv1.end, &sv2.end) else {
        return false;
    };

    let resolved_type = match (sv1.sv_type, sv2.sv_type) {
        (SvType::Bnd, SvType::Bnd) => {
            let mut chroms1 = [&sv1.start.chromosome, &end1.chromosome];
            let mut chroms2 = [&sv2.start.chromosome, &end2.chromosome];
            chroms1.sort();
            chroms2.sort();
            if chroms1 != chroms2 || !cluster.is_consistent() || !cluster.chains().is_empty() {
                return false;
            }
            ResolvedType::ReciprocalTranslocation
        }
        (SvType::Inv, SvType::Inv) => {
            if sv1.start.orientation == sv2.start.orientation
                || sv1.start.chromosome != sv2.start.chromosome
                || sv1.start.arm != sv2.start.arm
            {
                return false;
            }
            ResolvedType::ReciprocalInversion
        }
        _ => {
            return false;
        }
    };

    cluster.set_resolved(true, resolved_type);
    true
}

fn register_sv_patterns(cluster: &mut Cluster, settings: &ClusteringSettings) {
    let mut inversions = Vec::new();
    let mut foldbacks = Vec::new();
    let mut long_del_dups = Vec::new();
    for member in cluster.members() {
        let length = member.length();
        match member.sv_type {
            SvType::Inv => {
                inversions.push(member.sv_id);
                if length.is_some_and(|x| x < settings.proximity_distance) {
                    foldbacks.push(member.sv_id);
                }
            }
            SvType::Del | SvType::Dup => {
                if length.is_some_and(|x| x > settings.long_del_dup_length) {
                    long_del_dups.push(member.sv_id);
                }
            }
            _ => {}
        }
    }

    for sv_id in inversions {
        cluster.register_inversion(sv_id);
    }
    for sv_id in foldbacks {
        cluster.register_foldback(sv_id);
    }
    for sv_id in long_del_dups {
        cluster.register_long_del_dup(sv_id);
    }
}

/// Assign a resolved type to an unresolved cluster, register its SV patterns and set its ploidy
/// replication
///
/// Clusters which are already resolved, such as LINE clusters, keep their type but are otherwise
/// processed in the same way.
///
pub fn classify_cluster(
    cluster: &mut Cluster,
    settings: &ClusteringSettings,
    diagnostics: &mut Diagnostics,
) {
    if !cluster.is_resolved() {
        let sv_count = cluster.sv_count();
        if sv_count == 1 {
            let resolved_type = get_single_sv_resolved_type(cluster.members()[0].sv_type);
            cluster.set_resolved(true, resolved_type);
        } else if sv_count == 2 {
            if !classify_synthetic_del_dup(cluster, settings.long_del_dup_length) {
                classify_reciprocal_pair(cluster);
            }
        } else if sv_count >= 3 {
            cluster.set_resolved(false, ResolvedType::Complex);
        }
    }

    register_sv_patterns(cluster, settings);
    cluster.mark_subclonal();

    if cluster.sv_count() > 1 && !cluster.is_consistent() {
        diagnostics.push(Diagnostic::InconsistentCluster {
            cluster_id: cluster.id(),
            consistency_count: cluster.consistency_count(),
        });
    }

    cluster.set_ploidy_replication(settings.chaining_sv_limit, diagnostics);
}
