//! Divergence scoring between the two backends' views of the same write.

use dualstore_core::{Resource, ResourceList};

/// Whether two representations of the same logical write agree.
///
/// Total function: a missing side is a defined "different" outcome and never
/// fails the caller's operation. Objects carrying a version stamp on both
/// sides compare by stamp equality; when either stamp is unavailable the uid
/// serves as fallback.
pub fn compare_resource_version(a: Option<&Resource>, b: Option<&Resource>) -> bool {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    if !a.resource_version.is_empty() && !b.resource_version.is_empty() {
        return a.resource_version == b.resource_version;
    }
    !a.uid.is_empty() && a.uid == b.uid
}

/// List-level variant comparing the collection version stamps.
pub fn compare_list_resource_version(a: Option<&ResourceList>, b: Option<&ResourceList>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            !a.resource_version.is_empty() && a.resource_version == b.resource_version
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(rv: &str, uid: &str) -> Resource {
        Resource {
            resource_version: rv.to_string(),
            uid: uid.to_string(),
            ..Resource::named("obj", None)
        }
    }

    #[test]
    fn missing_side_is_different() {
        let a = res("3", "u");
        assert!(!compare_resource_version(None, Some(&a)));
        assert!(!compare_resource_version(Some(&a), None));
        assert!(!compare_resource_version(None, None));
    }

    #[test]
    fn equal_versions_are_same() {
        assert!(compare_resource_version(Some(&res("3", "a")), Some(&res("3", "b"))));
        assert!(!compare_resource_version(Some(&res("3", "a")), Some(&res("4", "a"))));
    }

    #[test]
    fn uid_fallback_when_version_unset() {
        assert!(compare_resource_version(Some(&res("", "u1")), Some(&res("9", "u1"))));
        assert!(!compare_resource_version(Some(&res("", "u1")), Some(&res("", "u2"))));
        // neither stamp nor uid available: different, not an error
        assert!(!compare_resource_version(Some(&res("", "")), Some(&res("", ""))));
    }

    #[test]
    fn list_versions_compare_by_stamp() {
        let a = ResourceList { resource_version: "12".into(), items: vec![] };
        let b = ResourceList { resource_version: "12".into(), items: vec![] };
        let c = ResourceList { resource_version: "13".into(), items: vec![] };
        assert!(compare_list_resource_version(Some(&a), Some(&b)));
        assert!(!compare_list_resource_version(Some(&a), Some(&c)));
        assert!(!compare_list_resource_version(Some(&a), None));
        let empty = ResourceList::default();
        assert!(!compare_list_resource_version(Some(&empty), Some(&empty)));
    }
}
