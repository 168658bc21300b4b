//! Trait seams for the external systems `uprobe_manager.cc` calls into
//! directly (libelf/libdw, the BPF loader, `/proc`). A hosted crate
//! with no kernel to attach to can't implement these for real, but
//! specifying them as traits keeps `manager.rs` compiling against
//! something concrete, and lets tests exercise the deploy pipeline
//! against fakes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::CoreResult;
use crate::uprobe::templates::{AttachType, MatchKind, UProbeSpec};

/// A symbol found in an ELF binary's symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub name: String,
    pub address: u64,
}

/// Reads function symbols and return-instruction addresses out of an
/// ELF binary. Stands in for `obj_tools::ElfReader` (and, for the
/// struct-offset lookups `GoCommonSymAddrs`/`GoTLSSymAddrs` need,
/// `obj_tools::DwarfReader`).
pub trait ElfSymbolReader {
    /// List function symbols matching `pattern` under `match_kind`.
    fn list_func_symbols(&self, pattern: &str, match_kind: MatchKind) -> CoreResult<Vec<SymbolInfo>>;

    /// Address of a single named symbol, if present. Used as the
    /// "is this even a Go binary" probe (`runtime.buildVersion`).
    fn symbol_address(&self, name: &str) -> Option<u64>;

    /// Addresses of every `ret` instruction in `symbol`'s body, for
    /// the `ReturnInsts` attach type.
    fn func_ret_inst_addrs(&self, symbol: &SymbolInfo) -> CoreResult<Vec<u64>>;

    /// Byte offset of `field` within `struct_name`, from DWARF debug
    /// info. Returns `NotFound` when the binary lacks debug symbols
    /// or the struct isn't mapped, mirroring `DwarfReader`'s failure
    /// mode that `UpdateGoCommonSymAddrs` treats as "not a buildable
    /// symaddrs struct, skip this binary".
    fn struct_member_offset(&self, struct_name: &str, field: &str) -> CoreResult<i64>;
}

/// Attaches a uprobe spec to a running process via the BPF loader.
/// Stands in for `bpf_tools::BCCWrapper::AttachUProbe`.
pub trait BpfAttacher {
    fn attach_uprobe(&self, spec: &UProbeSpec) -> CoreResult<()>;
}

/// Resolves paths as seen from inside a process's mount namespace.
/// Stands in for `LazyLoadedFPResolver`.
pub trait MountNamespaceResolver {
    fn set_mount_namespace(&mut self, pid: u32) -> CoreResult<()>;
    fn resolve_path(&self, mapped_path: &str) -> CoreResult<PathBuf>;
    /// Drop any cached namespace handles so the next lookup reflects
    /// current mounts.
    fn refresh(&mut self);
}

/// Reads per-process `/proc` state. Stands in for `system::ProcParser`:
/// `mapped_paths` is `GetMapPaths`, `exe_path` is the `/proc/<pid>/exe`
/// symlink target `ProcExe` reads before resolving it through the
/// mount namespace.
pub trait ProcMapsReader {
    fn mapped_paths(&self, pid: u32) -> CoreResult<HashSet<String>>;
    fn exe_path(&self, pid: u32) -> CoreResult<PathBuf>;
}

/// Checks whether a host path exists. A trait so tests can fake a
/// filesystem without touching the real one, mirroring the original's
/// `fs::Exists` guard before attaching to a resolved library path.
pub trait HostFs {
    fn exists(&self, path: &Path) -> bool;
}

/// Opens an ELF (+ DWARF, via [`ElfSymbolReader::struct_member_offset`])
/// reader for a binary path. Stands in for `ElfReader::Create`/
/// `DwarfReader::Create`, which the original calls once per binary
/// before running any of the symbol lookups above.
pub trait ElfReaderFactory {
    fn open(&self, binary: &Path) -> CoreResult<Box<dyn ElfSymbolReader>>;
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default, Clone)]
    pub struct FakeElfSymbolReader {
        pub symbols: Vec<SymbolInfo>,
        pub ret_inst_addrs: HashMap<String, Vec<u64>>,
        pub struct_offsets: HashMap<(String, String), i64>,
        pub is_golang: bool,
    }

    impl ElfSymbolReader for FakeElfSymbolReader {
        fn list_func_symbols(
            &self,
            pattern: &str,
            match_kind: MatchKind,
        ) -> CoreResult<Vec<SymbolInfo>> {
            Ok(self
                .symbols
                .iter()
                .filter(|s| match match_kind {
                    MatchKind::Exact => s.name == pattern,
                    MatchKind::Prefix => s.name.starts_with(pattern),
                    MatchKind::Suffix => s.name.ends_with(pattern),
                })
                .cloned()
                .collect())
        }

        fn symbol_address(&self, name: &str) -> Option<u64> {
            if name == "runtime.buildVersion" && !self.is_golang {
                return None;
            }
            self.symbols.iter().find(|s| s.name == name).map(|s| s.address)
        }

        fn func_ret_inst_addrs(&self, symbol: &SymbolInfo) -> CoreResult<Vec<u64>> {
            Ok(self.ret_inst_addrs.get(&symbol.name).cloned().unwrap_or_default())
        }

        fn struct_member_offset(&self, struct_name: &str, field: &str) -> CoreResult<i64> {
            self.struct_offsets
                .get(&(struct_name.to_string(), field.to_string()))
                .copied()
                .ok_or_else(|| crate::error::CoreError::NotFound {
                    message: format!("no debug info for {struct_name}.{field}"),
                })
        }
    }

    #[derive(Default)]
    pub struct FakeBpfAttacher {
        pub attached: RefCell<Vec<UProbeSpec>>,
        pub fail_on: Option<AttachType>,
    }

    impl BpfAttacher for FakeBpfAttacher {
        fn attach_uprobe(&self, spec: &UProbeSpec) -> CoreResult<()> {
            if Some(spec.attach_type) == self.fail_on {
                return Err(crate::error::CoreError::Unavailable {
                    message: "attach failed".to_string(),
                });
            }
            self.attached.borrow_mut().push(spec.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeMountNamespaceResolver {
        pub current_pid: Option<u32>,
        /// mapped_path -> resolved host path, scoped by pid.
        pub resolutions: HashMap<(u32, String), PathBuf>,
    }

    impl MountNamespaceResolver for FakeMountNamespaceResolver {
        fn set_mount_namespace(&mut self, pid: u32) -> CoreResult<()> {
            self.current_pid = Some(pid);
            Ok(())
        }

        fn resolve_path(&self, mapped_path: &str) -> CoreResult<PathBuf> {
            let pid = self.current_pid.ok_or_else(|| crate::error::CoreError::Internal {
                message: "resolve_path called before set_mount_namespace".to_string(),
            })?;
            self.resolutions
                .get(&(pid, mapped_path.to_string()))
                .cloned()
                .ok_or_else(|| crate::error::CoreError::NotFound {
                    message: format!("cannot resolve {mapped_path}"),
                })
        }

        fn refresh(&mut self) {}
    }

    #[derive(Default)]
    pub struct FakeProcMapsReader {
        pub maps: HashMap<u32, HashSet<String>>,
        pub exe_paths: HashMap<u32, PathBuf>,
    }

    impl ProcMapsReader for FakeProcMapsReader {
        fn mapped_paths(&self, pid: u32) -> CoreResult<HashSet<String>> {
            Ok(self.maps.get(&pid).cloned().unwrap_or_default())
        }

        fn exe_path(&self, pid: u32) -> CoreResult<PathBuf> {
            self.exe_paths
                .get(&pid)
                .cloned()
                .ok_or_else(|| crate::error::CoreError::NotFound {
                    message: format!("no /proc/{pid}/exe fixture"),
                })
        }
    }

    #[derive(Default)]
    pub struct FakeHostFs {
        pub present: std::collections::HashSet<PathBuf>,
    }

    impl HostFs for FakeHostFs {
        fn exists(&self, path: &Path) -> bool {
            self.present.contains(path)
        }
    }

    #[derive(Default)]
    pub struct FakeElfReaderFactory {
        pub binaries: HashMap<PathBuf, FakeElfSymbolReader>,
    }

    impl ElfReaderFactory for FakeElfReaderFactory {
        fn open(&self, binary: &Path) -> CoreResult<Box<dyn ElfSymbolReader>> {
            self.binaries
                .get(binary)
                .cloned()
                .map(|r| Box::new(r) as Box<dyn ElfSymbolReader>)
                .ok_or_else(|| crate::error::CoreError::NotFound {
                    message: format!("no ELF reader fixture for {}", binary.display()),
                })
        }
    }
}
