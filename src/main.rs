//! Inspect a synthetic sysfs tree from the command line.
use std::io::Write as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kernfs::fs::{Credentials, Dentry, DirentType, Fd, FsError, INodeType, OpenOptions};
use kernfs::sysfs::{SYSFS_NAME, SysfsType};
use kernfs::vfs::{FdTable, MountContext, MountNamespace, MountOptions, Registry, Vfs};
use thiserror::Error;
use tracing::{debug, error};

mod app_config;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

/// Bytes requested per `read` when dumping a file.
const READ_CHUNK: usize = 4096;

#[derive(Parser)]
#[command(version, about = "Mount a synthetic sysfs tree in memory and inspect it.")]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to a kernfs config TOML."
    )]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory.
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print the content of a file.
    Cat { path: String },

    /// Print the attributes of a node.
    Stat {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Recursively print a subtree without following symlinks.
    Tree {
        #[arg(default_value = "/")]
        path: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Fs(#[from] FsError),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

struct Session {
    vfs: Vfs,
    mns: MountNamespace,
    creds: Credentials,
    fds: FdTable,
}

impl Session {
    fn new(config: &Config) -> Result<Self, FsError> {
        let mut builder = Registry::builder();
        builder.must_register(SYSFS_NAME, SysfsType::new(config.sysfs.clone()));
        let registry = kernfs::vfs::install_global(builder.build())?;

        let vfs = Vfs::new(registry);
        let mns = vfs.new_mount_namespace(
            &MountContext::now(),
            &Credentials::root(),
            SYSFS_NAME,
            SYSFS_NAME,
            &MountOptions {
                data: None,
                read_only: true,
            },
        )?;
        Ok(Self {
            vfs,
            mns,
            creds: config.credentials(),
            fds: FdTable::new(),
        })
    }

    fn ls(&self, path: &str, out: &mut impl std::io::Write) -> Result<(), CliError> {
        let pop = self.mns.path_op_at_root(path);
        let fd = self
            .fds
            .open_at(&self.vfs, &self.creds, &pop, OpenOptions::directory())?;
        let entries = self.fds.iterate_directory(fd);
        self.fds.close(fd)?;
        for (name, dtype) in entries? {
            let tag = match dtype {
                DirentType::Directory => 'd',
                DirentType::RegularFile => '-',
                DirentType::Symlink => 'l',
            };
            writeln!(out, "{tag} {name}")?;
        }
        Ok(())
    }

    fn cat(&self, path: &str, out: &mut impl std::io::Write) -> Result<(), CliError> {
        let pop = self.mns.path_op_at_root(path);
        let fd = self
            .fds
            .open_at(&self.vfs, &self.creds, &pop, OpenOptions::read_only())?;
        let result = self.copy_out(fd, out);
        self.fds.close(fd)?;
        result
    }

    fn copy_out(&self, fd: Fd, out: &mut impl std::io::Write) -> Result<(), CliError> {
        loop {
            let chunk = self.fds.read(fd, READ_CHUNK)?;
            if chunk.is_empty() {
                return Ok(());
            }
            out.write_all(&chunk)?;
        }
    }

    fn stat(&self, path: &str, out: &mut impl std::io::Write) -> Result<(), CliError> {
        let attr = self
            .vfs
            .getattr_at(&self.creds, &self.mns.path_op_at_root(path))?;
        writeln!(out, "  File: {path}")?;
        writeln!(
            out,
            "  Type: {:?}  Size: {}  Blocks: {}",
            attr.itype, attr.size, attr.blksize
        )?;
        writeln!(out, " Inode: {}  Links: {}", attr.ino, attr.nlink)?;
        writeln!(
            out,
            "Access: ({:04o})  Uid: {}  Gid: {}",
            attr.perms.mode(),
            attr.uid,
            attr.gid
        )?;
        writeln!(out, "    Fs: {}", attr.fs_type)?;
        Ok(())
    }

    fn tree(&self, path: &str, out: &mut impl std::io::Write) -> Result<(), CliError> {
        let dentry: Dentry = self
            .vfs
            .resolve(&self.creds, &self.mns.path_op_at_root(path))?;
        writeln!(out, "{}", dentry.path())?;
        self.tree_rec(&dentry, 1, out)
    }

    /// Children are listed and resolved through the VFS so the access policy applies.
    fn tree_rec(
        &self,
        dir: &Dentry,
        depth: usize,
        out: &mut impl std::io::Write,
    ) -> Result<(), CliError> {
        let listing = self.vfs.open_at(
            &self.creds,
            &self.mns.path_op_at(dir, ""),
            OpenOptions::directory(),
        )?;
        for entry in listing.iterate()? {
            let child = self.vfs.resolve(
                &self.creds,
                &self.mns.path_op_at(dir, entry.name.as_str()).no_follow(),
            )?;
            let indent = "  ".repeat(depth);
            match child.inode().itype() {
                INodeType::Symlink => {
                    writeln!(out, "{indent}{} -> {}", entry.name, child.inode().readlink()?)?;
                }
                INodeType::File => writeln!(out, "{indent}{}", entry.name)?,
                INodeType::Directory => {
                    writeln!(out, "{indent}{}/", entry.name)?;
                    self.tree_rec(&child, depth + 1, out)?;
                }
            }
        }
        Ok(())
    }
}

fn run(command: Command, config: &Config) -> Result<(), CliError> {
    let session = Session::new(config)?;
    debug!(uid = session.creds.uid, gid = session.creds.gid, "resolving as");
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match command {
        Command::Ls { path } => session.ls(&path, &mut out),
        Command::Cat { path } => session.cat(&path, &mut out),
        Command::Stat { path } => session.stat(&path, &mut out),
        Command::Tree { path } => session.tree(&path, &mut out),
    }?;
    out.flush()?;
    Ok(())
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let config = Config::load_or_default(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });

    Trc::default().init().unwrap_or_else(|e| {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    });
    debug!(config = ?config, "Loaded configuration.");

    if let Err(e) = run(args.command, &config) {
        error!("{e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use kernfs::fs::{AccessPolicy, Attr, ModeBits};

    use super::*;

    /// Refuses traversal of one inode, chosen after mounting.
    struct DenyTraverse(Arc<AtomicU64>);

    impl AccessPolicy for DenyTraverse {
        fn can_traverse(&self, _creds: &Credentials, attr: &Attr) -> bool {
            attr.ino != self.0.load(Ordering::SeqCst)
        }

        fn can_read(&self, _creds: &Credentials, _attr: &Attr) -> bool {
            true
        }
    }

    fn session(cores: u32) -> Session {
        session_with(cores, Arc::new(ModeBits))
    }

    fn session_with(cores: u32, policy: Arc<dyn AccessPolicy>) -> Session {
        let config = Config {
            sysfs: kernfs::sysfs::SysfsConfig {
                max_cpu_cores: cores,
                modules: vec!["loop".to_owned()],
            },
            uid: 0,
            gid: 0,
        };
        let mut builder = Registry::builder();
        builder.must_register(SYSFS_NAME, SysfsType::new(config.sysfs.clone()));
        let vfs = Vfs::new(Arc::new(builder.build())).with_policy(policy);
        let mns = vfs
            .new_mount_namespace(
                &MountContext::now(),
                &Credentials::root(),
                "",
                SYSFS_NAME,
                &MountOptions::default(),
            )
            .unwrap();
        Session {
            vfs,
            mns,
            creds: config.credentials(),
            fds: FdTable::new(),
        }
    }

    fn output(f: impl FnOnce(&mut Vec<u8>) -> Result<(), CliError>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn cat_prints_cpu_range() {
        let s = session(4);
        let text = output(|out| s.cat("/devices/system/cpu/online", out));
        assert_eq!(text, "0-3");
        assert!(s.fds.is_empty(), "cat must close its descriptor");
    }

    #[test]
    fn ls_marks_entry_types() {
        let s = session(2);
        let text = output(|out| s.ls("/bus/cpu/devices", out));
        assert_eq!(text, "l cpu0\nl cpu1\n");
    }

    #[test]
    fn tree_does_not_follow_links() {
        let s = session(1);
        let text = output(|out| s.tree("/bus", out));
        assert_eq!(
            text,
            "/bus\n  cpu/\n    devices/\n      cpu0 -> ../../../devices/system/cpu/cpu0\n"
        );
    }

    #[test]
    fn ls_of_a_file_is_an_error() {
        let s = session(1);
        let mut buf = Vec::new();
        assert!(matches!(
            s.ls("/devices/system/cpu/online", &mut buf),
            Err(CliError::Fs(FsError::NotADirectory))
        ));
    }

    #[test]
    fn tree_stops_at_directories_it_may_not_traverse() {
        let denied = Arc::new(AtomicU64::new(u64::MAX));
        let s = session_with(1, Arc::new(DenyTraverse(Arc::clone(&denied))));
        let cpu = s
            .vfs
            .resolve(&s.creds, &s.mns.path_op_at_root("/bus/cpu"))
            .unwrap();
        denied.store(cpu.inode().ino(), Ordering::SeqCst);

        let mut buf = Vec::new();
        assert!(matches!(
            s.tree("/bus", &mut buf),
            Err(CliError::Fs(FsError::PermissionDenied))
        ));
        assert_eq!(String::from_utf8(buf).unwrap(), "/bus\n  cpu/\n");
    }
}
