use std::path::PathBuf;

use tempfile::TempDir;
use vortex_core::Error;
use vortex_mount::*;

const ID: &str = "0123456789abcdef";

/// Count entries targeting `destination` across spec mounts and binds
fn mounted_at(spec: &Spec, binds: &[Bind], destination: &str) -> usize {
    spec.mounts_at(destination).count()
        + binds
            .iter()
            .filter(|b| destination_of(b) == destination)
            .count()
}

fn options(mount: &Mount) -> Vec<String> {
    mount.options().clone().unwrap_or_default()
}

#[test]
fn test_special_paths_mounted_exactly_once() {
    let mut spec = Spec::default();
    let requests = [
        MountRequest::new("/sys", "/sys"),
        MountRequest::new("/dev", "/dev"),
        MountRequest::new("/proc", "/proc"),
    ];

    let result = MountClassifier::new()
        .classify(ID, &requests, &mut spec)
        .unwrap();

    for path in SPECIAL_PATHS {
        assert_eq!(mounted_at(&spec, &result.binds, path), 1, "{path}");
    }
    assert!(result.binds.iter().all(|b| b.typ().is_none()));
    assert_eq!(result.volumes.len(), 3);
}

#[test]
fn test_empty_container_id_is_accepted() {
    let mut spec = Spec::default();

    let result = MountClassifier::new()
        .classify("", &[MountRequest::new("/dev", "/dev")], &mut spec)
        .unwrap();

    assert_eq!(result.binds.len(), 1);
}

#[test]
fn test_ordinary_mounts_go_to_spec() {
    let dir = TempDir::new().unwrap();
    let host = dir.path().join("data");
    std::fs::create_dir(&host).unwrap();

    let mut spec = Spec::default();
    let requests = [MountRequest::new("/data", host.to_str().unwrap()).with_readonly(true)];

    let result = MountClassifier::new()
        .classify(ID, &requests, &mut spec)
        .unwrap();

    assert!(result.binds.is_empty());
    let data: Vec<_> = spec.mounts_at("/data").collect();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].typ().as_deref(), Some("bind"));
    assert_eq!(options(data[0]), vec!["ro", "rbind", "rprivate"]);
    assert_eq!(result.volumes.len(), 1);
    assert!(result.volumes[0].readonly);

    // Defaults untouched
    assert_eq!(spec.mounts_at("/dev").count(), 1);
    assert_eq!(spec.mounts_at("/sys").count(), 1);
}

#[test]
fn test_requested_dev_child_survives_dev_bind() {
    let dir = TempDir::new().unwrap();
    let shm = dir.path().join("shm");
    std::fs::create_dir(&shm).unwrap();

    let mut spec = Spec::default();
    // Child listed first; parents are still handled first
    let requests = [
        MountRequest::new("/dev/shm", shm.to_str().unwrap()),
        MountRequest::new("/dev", "/dev"),
    ];

    let result = MountClassifier::new()
        .classify(ID, &requests, &mut spec)
        .unwrap();

    assert_eq!(mounted_at(&spec, &result.binds, "/dev"), 1);
    let shm_mounts: Vec<_> = spec.mounts_at("/dev/shm").collect();
    assert_eq!(shm_mounts.len(), 1);
    assert_eq!(shm_mounts[0].typ().as_deref(), Some("bind"));
    assert_eq!(spec.mounts_at("/dev/pts").count(), 0);
}

#[test]
fn test_sys_bind_leaves_cgroup_read_only() {
    let mut spec = Spec::default();

    let result = MountClassifier::new()
        .classify(ID, &[MountRequest::new("/sys", "/sys")], &mut spec)
        .unwrap();

    assert_eq!(mounted_at(&spec, &result.binds, "/sys"), 1);
    let cgroup: Vec<_> = spec.mounts_at("/sys/fs/cgroup").collect();
    assert_eq!(cgroup.len(), 1);
    assert!(options(cgroup[0]).iter().any(|o| o == "ro"));
}

#[test]
fn test_duplicate_special_request_last_wins() {
    let dir = TempDir::new().unwrap();
    let mut spec = Spec::default();
    let requests = [
        MountRequest::new("/dev", "/dev"),
        MountRequest::new("/dev/", dir.path().to_str().unwrap()),
    ];

    let result = MountClassifier::new()
        .classify(ID, &requests, &mut spec)
        .unwrap();

    assert_eq!(mounted_at(&spec, &result.binds, "/dev"), 1);
    assert_eq!(result.binds[0].source().as_deref(), Some(dir.path()));
    assert_eq!(result.volumes.len(), 1);
}

#[test]
fn test_invalid_request_fails_before_touching_its_entry() {
    let mut spec = Spec::default();
    let requests = [
        MountRequest::new("/dev", "/dev"),
        MountRequest::new("/sys", ""),
    ];

    let err = MountClassifier::new()
        .classify(ID, &requests, &mut spec)
        .unwrap_err();

    assert!(matches!(err, Error::InvalidMount { .. }));
    // The /dev edit stays, the /sys entry was never touched
    assert_eq!(spec.mounts_at("/dev").count(), 0);
    assert_eq!(spec.mounts_at("/sys").count(), 1);
}

#[test]
fn test_missing_container_path() {
    let mut spec = Spec::default();
    let before = spec.clone();

    let err = MountClassifier::new()
        .classify(ID, &[MountRequest::new("", "/dev")], &mut spec)
        .unwrap_err();

    assert!(matches!(err, Error::InvalidMount { .. }));
    assert_eq!(spec, before);
}

#[test]
fn test_missing_source_is_created_under_prefix() {
    let prefix = TempDir::new().unwrap();
    let mut spec = Spec::default();
    let requests = [MountRequest::new("/cache", "/var/cache/app")];

    let result = MountClassifier::new()
        .with_prefix(prefix.path())
        .classify(ID, &requests, &mut spec)
        .unwrap();

    let expected = prefix.path().join("var/cache/app");
    assert!(expected.is_dir());
    assert_eq!(PathBuf::from(&result.volumes[0].host_path), expected);
}

#[test]
fn test_absent_source_rejected() {
    let dir = TempDir::new().unwrap();
    let hostname = dir.path().join("hostname");
    let mut spec = Spec::default();
    spec.set_mounts(None);
    let requests = [MountRequest::new("/etc/hostname", hostname.to_str().unwrap())];

    let err = MountClassifier::new()
        .with_absent_sources_to_reject(vec![hostname.clone()])
        .classify(ID, &requests, &mut spec)
        .unwrap_err();

    assert!(matches!(err, Error::InvalidMount { .. }));
    assert!(!hostname.exists());
    assert!(spec.mount_entries().is_empty());
}

#[test]
fn test_symlinked_source_is_resolved() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("target");
    let link = dir.path().join("link");
    std::fs::create_dir(&target).unwrap();
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let mut spec = Spec::default();
    let requests = [MountRequest::new("/data", link.to_str().unwrap())];

    let result = MountClassifier::new()
        .classify(ID, &requests, &mut spec)
        .unwrap();

    assert_eq!(
        PathBuf::from(&result.volumes[0].host_path),
        std::fs::canonicalize(&target).unwrap()
    );
}

/// A prefix holding `escape -> <outside dir>` and `inner -> real`
fn prefix_with_links() -> (TempDir, TempDir) {
    let prefix = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    std::fs::create_dir(outside.path().join("secret")).unwrap();
    std::fs::create_dir_all(prefix.path().join("real/data")).unwrap();
    std::os::unix::fs::symlink(outside.path(), prefix.path().join("escape")).unwrap();
    std::os::unix::fs::symlink(prefix.path().join("real"), prefix.path().join("inner"))
        .unwrap();
    (prefix, outside)
}

#[test]
fn test_intermediate_symlink_cannot_leave_prefix() {
    let (prefix, _outside) = prefix_with_links();
    let mut spec = Spec::default();

    let err = MountClassifier::new()
        .with_prefix(prefix.path())
        .classify(ID, &[MountRequest::new("/data", "/escape/secret")], &mut spec)
        .unwrap_err();

    assert!(matches!(err, Error::InvalidMount { .. }));
    assert_eq!(spec.mounts_at("/data").count(), 0);
}

#[test]
fn test_missing_source_below_escaping_symlink_not_created() {
    let (prefix, outside) = prefix_with_links();
    let mut spec = Spec::default();

    let err = MountClassifier::new()
        .with_prefix(prefix.path())
        .classify(ID, &[MountRequest::new("/data", "/escape/new")], &mut spec)
        .unwrap_err();

    assert!(matches!(err, Error::InvalidMount { .. }));
    assert!(!outside.path().join("new").exists());
}

#[test]
fn test_intermediate_symlink_inside_prefix_is_resolved() {
    let (prefix, _outside) = prefix_with_links();
    let mut spec = Spec::default();

    let result = MountClassifier::new()
        .with_prefix(prefix.path())
        .classify(ID, &[MountRequest::new("/data", "/inner/data")], &mut spec)
        .unwrap();

    assert_eq!(
        PathBuf::from(&result.volumes[0].host_path),
        std::fs::canonicalize(prefix.path().join("real/data")).unwrap()
    );
}

#[test]
fn test_bidirectional_sets_root_propagation() {
    let mut spec = Spec::default();
    let requests =
        [MountRequest::new("/dev", "/dev").with_propagation(Propagation::Bidirectional)];

    let result = MountClassifier::new()
        .classify(ID, &requests, &mut spec)
        .unwrap();

    assert_eq!(spec.root_propagation(), Some("rshared"));
    assert_eq!(options(&result.binds[0]), vec!["rw", "rbind", "rshared"]);
}
