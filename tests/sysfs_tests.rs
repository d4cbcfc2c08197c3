#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use common::TestSystem;
use kernfs::fs::{DirentType, FsError, INodeType};
use kernfs::sysfs::{CPU_CORES_LIMIT, MAX_CPU_CORES, SysfsConfig, SysfsType};
use kernfs::vfs::FilesystemType;

fn config(cores: u32, modules: &[&str]) -> SysfsConfig {
    SysfsConfig {
        max_cpu_cores: cores,
        modules: modules.iter().map(|m| (*m).to_owned()).collect(),
    }
}

#[test]
fn root_has_the_standard_layout() {
    let sys = TestSystem::sysfs();
    sys.assert_directory_is(
        "/",
        &[
            ("block", DirentType::Directory),
            ("bus", DirentType::Directory),
            ("class", DirentType::Directory),
            ("dev", DirentType::Directory),
            ("devices", DirentType::Directory),
            ("firmware", DirentType::Directory),
            ("fs", DirentType::Directory),
            ("kernel", DirentType::Directory),
            ("module", DirentType::Directory),
            ("power", DirentType::Directory),
        ],
    );
    sys.assert_directory_is("/class", &[("power_supply", DirentType::Directory)]);
    sys.assert_directory_is(
        "/dev",
        &[("block", DirentType::Directory), ("char", DirentType::Directory)],
    );
    sys.assert_directory_is("/kernel", &[("debug", DirentType::Directory)]);
    sys.assert_directory_is("/firmware", &[]);
}

#[test]
fn default_config_reports_1024_cpus() {
    assert_eq!(SysfsConfig::default().max_cpu_cores, MAX_CPU_CORES);
    let sys = TestSystem::sysfs();
    for file in ["online", "possible", "present"] {
        let path = format!("/devices/system/cpu/{file}");
        assert_eq!(sys.read_to_end(&path), "0-1023", "{path}");
    }
    assert_eq!(sys.list("/devices/system/cpu").len(), 1024 + 3);
}

#[test]
fn cpu_files_are_read_only_text() {
    let sys = TestSystem::sysfs_with(config(8, &[]));
    let attr = sys.resolve("/devices/system/cpu/online").unwrap().inode().getattr();
    assert_eq!(attr.itype, INodeType::File);
    assert_eq!(attr.perms.mode(), 0o444);
    assert_eq!(attr.size, 3);
    assert_eq!(&*attr.fs_type, "sysfs");
}

#[test]
fn single_core_range_is_zero_to_zero() {
    let sys = TestSystem::sysfs_with(config(1, &[]));
    assert_eq!(sys.read_to_end("/devices/system/cpu/online"), "0-0");
    assert_eq!(sys.read_to_end("/devices/system/cpu/present"), "0-0");
}

#[test]
fn zero_cores_is_treated_as_one() {
    let sys = TestSystem::sysfs_with(config(0, &[]));
    assert_eq!(sys.read_to_end("/devices/system/cpu/possible"), "0-0");
    sys.assert_directory_is("/bus/cpu/devices", &[("cpu0", DirentType::Symlink)]);
}

#[test]
fn per_cpu_directories_are_synthesized() {
    let sys = TestSystem::sysfs_with(config(4, &[]));
    sys.assert_directory_is(
        "/devices/system/cpu",
        &[
            ("cpu0", DirentType::Directory),
            ("cpu1", DirentType::Directory),
            ("cpu2", DirentType::Directory),
            ("cpu3", DirentType::Directory),
            ("online", DirentType::RegularFile),
            ("possible", DirentType::RegularFile),
            ("present", DirentType::RegularFile),
        ],
    );
    sys.assert_directory_is("/devices/system/cpu/cpu2", &[("online", DirentType::RegularFile)]);
    assert_eq!(sys.read_to_end("/devices/system/cpu/cpu2/online"), "1\n");
}

#[test]
fn out_of_range_cpus_do_not_exist() {
    let sys = TestSystem::sysfs_with(config(4, &[]));
    for name in ["cpu4", "cpu99999", "cpu01", "cpu-1", "cpux"] {
        assert_eq!(
            sys.resolve(&format!("/devices/system/cpu/{name}")).unwrap_err(),
            FsError::NotFound,
            "{name}"
        );
        assert_eq!(
            sys.resolve(&format!("/bus/cpu/devices/{name}")).unwrap_err(),
            FsError::NotFound,
            "{name}"
        );
    }
}

#[test]
fn bus_links_point_at_cpu_directories() {
    let sys = TestSystem::sysfs_with(config(2, &[]));
    sys.assert_directory_is(
        "/bus/cpu/devices",
        &[("cpu0", DirentType::Symlink), ("cpu1", DirentType::Symlink)],
    );
    let pop = sys.path_op_at_root("/bus/cpu/devices/cpu1");
    assert_eq!(
        &*sys.vfs.readlink_at(&sys.creds, &pop).unwrap(),
        "../../../devices/system/cpu/cpu1"
    );

    let via_link = sys.resolve("/bus/cpu/devices/cpu1").unwrap();
    let direct = sys.resolve("/devices/system/cpu/cpu1").unwrap();
    assert!(via_link.same_inode(&direct), "the link resolves to the cached directory");
    assert_eq!(via_link.path(), "/devices/system/cpu/cpu1");
    assert_eq!(sys.read_to_end("/bus/cpu/devices/cpu0/online"), "1\n");
}

#[test]
fn module_directories_follow_config() {
    let sys = TestSystem::sysfs_with(config(1, &["loop", "ext4", "loop"]));
    sys.assert_directory_is(
        "/module",
        &[("ext4", DirentType::Directory), ("loop", DirentType::Directory)],
    );
    assert_eq!(sys.read_to_end("/module/ext4/refcnt"), "0\n");
    assert_eq!(sys.resolve("/module/btrfs").unwrap_err(), FsError::NotFound);
}

#[test]
fn empty_directories_stay_empty() {
    let sys = TestSystem::sysfs();
    for dir in ["/block", "/fs", "/power", "/kernel/debug", "/class/power_supply"] {
        assert!(sys.list(dir).is_empty(), "{dir} should be empty");
    }
    sys.assert_directory_is("/module", &[]);
}

#[test]
fn sysfs_rejects_writes() {
    let sys = TestSystem::sysfs();
    let err = sys
        .vfs
        .open_at(
            &sys.creds,
            &sys.path_op_at_root("/devices/system/cpu/online"),
            kernfs::fs::OpenOptions::new(kernfs::fs::OpenFlags::WRONLY),
        )
        .unwrap_err();
    assert_eq!(err, FsError::ReadOnlyFilesystem);
}

#[test]
fn config_validation_reports_each_problem() {
    assert!(SysfsConfig::default().validate().is_empty());
    let errors = config(0, &["ok", "bad/name", ".."]).validate();
    assert_eq!(errors.len(), 3, "{errors:?}");
    assert!(errors[0].contains("max-cpu-cores"));

    assert!(config(CPU_CORES_LIMIT, &[]).validate().is_empty());
    let errors = config(CPU_CORES_LIMIT + 1, &[]).validate();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("at most"));
}

#[test]
fn oversized_core_counts_are_clamped() {
    let sys = TestSystem::sysfs_with(config(u32::MAX, &[]));
    let last = CPU_CORES_LIMIT - 1;
    assert_eq!(
        sys.read_to_end("/devices/system/cpu/online"),
        format!("0-{last}")
    );
    assert!(sys.resolve(&format!("/devices/system/cpu/cpu{last}")).is_ok());
    assert_eq!(
        sys.resolve(&format!("/devices/system/cpu/cpu{CPU_CORES_LIMIT}")).unwrap_err(),
        FsError::NotFound
    );
    assert_eq!(
        sys.list("/bus/cpu/devices").len(),
        usize::try_from(CPU_CORES_LIMIT).unwrap()
    );
}

#[test]
fn sysfs_type_is_named_sysfs() {
    let ty = SysfsType::default();
    assert_eq!(ty.name(), "sysfs");
    assert_eq!(ty.config(), &SysfsConfig::default());
    assert!(ty.build_tree().is_dir());
}
