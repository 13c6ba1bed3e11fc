use std::cmp::Ordering;

/// Outcome of comparing a local build's schema version against a document's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCmp {
    Older,
    Same,
    Newer,
    Invalid,
}

fn parse_segments(version: &str) -> Option<Vec<u64>> {
    version
        .split('.')
        .map(|segment| {
            if segment.is_empty() || !segment.bytes().all(|byte| byte.is_ascii_digit()) {
                return None;
            }
            segment.parse::<u64>().ok()
        })
        .collect()
}

/// Compares two version strings as dotted non-negative integer tuples. A
/// non-numeric segment or a differing segment count is `Invalid`; there is no
/// normalization, so `"1.0"` and `"1.0.0"` do not compare.
pub fn compare(local: &str, remote: &str) -> VersionCmp {
    let (Some(left), Some(right)) = (parse_segments(local), parse_segments(remote)) else {
        return VersionCmp::Invalid;
    };
    if left.len() != right.len() {
        return VersionCmp::Invalid;
    }
    for (a, b) in left.iter().zip(right.iter()) {
        match a.cmp(b) {
            Ordering::Less => return VersionCmp::Older,
            Ordering::Greater => return VersionCmp::Newer,
            Ordering::Equal => {}
        }
    }
    VersionCmp::Same
}

/// Write-gate policy: blocks on any ambiguity. An empty string, an invalid
/// comparison, or a local build older than the document all block; a same or
/// newer local build writes freely.
pub fn should_block(local: &str, remote: &str) -> bool {
    if local.is_empty() || remote.is_empty() {
        return true;
    }
    matches!(compare(local, remote), VersionCmp::Invalid | VersionCmp::Older)
}

/// Whether a stored document already meets a migration's target version.
pub fn is_at_or_after(document_version: &str, target_version: &str) -> bool {
    !should_block(document_version, target_version)
}
