//! The uprobe deployment pipeline.
//!
//! Grounded on `uprobe_manager.cc`'s `UProbeManager` class: `Init` sets
//! up the four symbol maps, `RunDeployUProbesThread`/`DeployUProbes`
//! run the six-step pipeline under a single mutex so deployments never
//! run concurrently, and `NotifyMMapEvent` is the producer side of the
//! dlopen-rescan signal.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashSet;
use parking_lot::Mutex;

use crate::config::UProbeConfig;
use crate::error::{CoreError, CoreResult};
use crate::uprobe::backoff::RescanBackoff;
use crate::uprobe::collaborators::{BpfAttacher, ElfReaderFactory, ElfSymbolReader, HostFs, MountNamespaceResolver, ProcMapsReader};
use crate::uprobe::proc_tracker::ProcTracker;
use crate::uprobe::symbols::{
    resolve_go_common_sym_addrs, resolve_go_http2_sym_addrs, resolve_go_tls_sym_addrs,
    resolve_openssl_sym_addrs, GoCommonSymAddrs, GoHttp2SymAddrs, GoTlsSymAddrs, OpenSslSymAddrs,
    SymbolMap, UserManagedMap,
};
use crate::uprobe::templates::{attach_uprobe_tmpl, UProbeSpec, GO_TLS_UPROBE_TMPLS, HTTP2_PROBE_TMPLS, OPENSSL_UPROBES};
use crate::uprobe::upid::Upid;

const LIBSSL: &str = "libssl.so.1.1";
const LIBCRYPTO: &str = "libcrypto.so.1.1";

/// Outcome of one `deploy_uprobes` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeploymentReport {
    pub uprobe_count: usize,
}

/// State touched only while `deploy_mutex` is held: one deployment
/// runs start-to-finish before the next can begin.
struct DeployState {
    proc_tracker: ProcTracker,
    fp_resolver: Box<dyn MountNamespaceResolver + Send>,
    proc_maps: Box<dyn ProcMapsReader + Send>,
    backoff: RescanBackoff,
    openssl_probed_binaries: HashSet<PathBuf>,
    go_tls_probed_binaries: HashSet<PathBuf>,
    go_http2_probed_binaries: HashSet<PathBuf>,
    scanned_binaries: HashSet<PathBuf>,
}

pub struct UProbeManager {
    deploy_state: Mutex<DeployState>,
    num_deploy_threads: AtomicUsize,
    upids_with_mmap: DashSet<Upid>,

    openssl_symaddrs_map: UserManagedMap<u32, OpenSslSymAddrs>,
    go_common_symaddrs_map: UserManagedMap<u32, GoCommonSymAddrs>,
    go_http2_symaddrs_map: UserManagedMap<u32, GoHttp2SymAddrs>,
    go_tls_symaddrs_map: UserManagedMap<u32, GoTlsSymAddrs>,

    elf_reader_factory: Box<dyn ElfReaderFactory + Send + Sync>,
    attacher: Box<dyn BpfAttacher + Send + Sync>,
    host_fs: Box<dyn HostFs + Send + Sync>,

    enable_http2_tracing: bool,
    disable_self_probing: bool,
    rescan_for_dlopen: bool,
    self_pid: u32,
}

impl UProbeManager {
    pub fn new(
        cfg: &UProbeConfig,
        elf_reader_factory: Box<dyn ElfReaderFactory + Send + Sync>,
        attacher: Box<dyn BpfAttacher + Send + Sync>,
        fp_resolver: Box<dyn MountNamespaceResolver + Send>,
        proc_maps: Box<dyn ProcMapsReader + Send>,
        host_fs: Box<dyn HostFs + Send + Sync>,
        self_pid: u32,
    ) -> Self {
        UProbeManager {
            deploy_state: Mutex::new(DeployState {
                proc_tracker: ProcTracker::new(),
                fp_resolver,
                proc_maps,
                backoff: RescanBackoff::new(cfg.rescan_exp_backoff_factor),
                openssl_probed_binaries: HashSet::new(),
                go_tls_probed_binaries: HashSet::new(),
                go_http2_probed_binaries: HashSet::new(),
                scanned_binaries: HashSet::new(),
            }),
            num_deploy_threads: AtomicUsize::new(0),
            upids_with_mmap: DashSet::new(),
            openssl_symaddrs_map: UserManagedMap::new(),
            go_common_symaddrs_map: UserManagedMap::new(),
            go_http2_symaddrs_map: UserManagedMap::new(),
            go_tls_symaddrs_map: UserManagedMap::new(),
            elf_reader_factory,
            attacher,
            host_fs,
            enable_http2_tracing: cfg.enable_http2_tracing,
            disable_self_probing: cfg.disable_self_probing,
            rescan_for_dlopen: cfg.rescan_for_dlopen,
            self_pid,
        }
    }

    /// Record that the kernel observed an mmap in `upid`'s address
    /// space, making it a dlopen-rescan candidate next deploy call.
    pub fn notify_mmap(&self, upid: Upid) {
        self.upids_with_mmap.insert(upid);
    }

    pub fn num_deploy_threads(&self) -> usize {
        self.num_deploy_threads.load(Ordering::SeqCst)
    }

    /// Spawn a background deployment for `pids`, returning a handle to
    /// its eventual report. The counter is incremented before the
    /// thread starts so a racing caller can never observe 0 in-flight
    /// deployments while one is about to begin.
    pub fn spawn_deploy(self: &Arc<Self>, pids: HashSet<Upid>) -> std::thread::JoinHandle<DeploymentReport> {
        self.num_deploy_threads.fetch_add(1, Ordering::SeqCst);
        let manager = Arc::clone(self);
        std::thread::spawn(move || {
            let report = manager.deploy_uprobes(&pids);
            manager.num_deploy_threads.fetch_sub(1, Ordering::SeqCst);
            report
        })
    }

    /// Run one full deployment pass: refresh process tracking, clean
    /// up dead processes' symbol maps, attach OpenSSL probes to new
    /// (and, if enabled, rescan-eligible) processes, then Go probes to
    /// new processes. At most one call executes at a time.
    pub fn deploy_uprobes(&self, pids: &HashSet<Upid>) -> DeploymentReport {
        let mut state = self.deploy_state.lock();

        state.proc_tracker.update(pids);
        self.cleanup_symaddr_maps(state.proc_tracker.deleted_upids());
        state.fp_resolver.refresh();

        let new_upids = state.proc_tracker.new_upids().clone();
        let known_upids = state.proc_tracker.upids().clone();

        let mut uprobe_count = 0;
        uprobe_count += self.deploy_openssl_uprobes(&mut state, &new_upids);

        if self.rescan_for_dlopen {
            let mmap_snapshot: HashSet<Upid> = self.upids_with_mmap.iter().map(|r| *r).collect();
            let to_rescan = state.backoff.pids_to_rescan(&mmap_snapshot, &known_upids, &new_upids);
            self.upids_with_mmap.clear();
            uprobe_count += self.deploy_openssl_uprobes(&mut state, &to_rescan);
        }

        uprobe_count += self.deploy_go_uprobes(&mut state, &new_upids);

        if uprobe_count != 0 {
            tracing::info!(uprobe_count, "uprobes deployed");
        }

        DeploymentReport { uprobe_count }
    }

    fn cleanup_symaddr_maps(&self, deleted_upids: &HashSet<Upid>) {
        for upid in deleted_upids {
            self.openssl_symaddrs_map.remove_value(&upid.pid);
            self.go_common_symaddrs_map.remove_value(&upid.pid);
            self.go_tls_symaddrs_map.remove_value(&upid.pid);
            self.go_http2_symaddrs_map.remove_value(&upid.pid);
        }
    }

    fn deploy_openssl_uprobes(&self, state: &mut DeployState, upids: &HashSet<Upid>) -> usize {
        let mut uprobe_count = 0;
        for upid in upids {
            if self.disable_self_probing && upid.pid == self.self_pid {
                continue;
            }
            match self.attach_openssl_uprobes(state, upid.pid) {
                Ok(n) => uprobe_count += n,
                Err(e) => tracing::debug!(pid = upid.pid, error = %e, "AttachOpenSSLUProbes failed"),
            }
        }
        uprobe_count
    }

    /// Returns `Ok(0)` (not an error) when the process doesn't appear
    /// to use OpenSSL at all.
    fn attach_openssl_uprobes(&self, state: &mut DeployState, pid: u32) -> CoreResult<usize> {
        let container_libs = self.find_library_paths(state, &[LIBSSL, LIBCRYPTO], pid)?;
        let container_libssl = &container_libs[0];
        let container_libcrypto = &container_libs[1];

        if container_libssl.as_os_str().is_empty() || container_libcrypto.as_os_str().is_empty() {
            return Ok(0);
        }

        if !self.host_fs.exists(container_libssl) || !self.host_fs.exists(container_libcrypto) {
            return Err(CoreError::NotFound {
                message: format!("resolved library path does not exist on host: {}", container_libssl.display()),
            });
        }

        let elf = self.elf_reader_factory.open(container_libcrypto)?;
        let symaddrs = resolve_openssl_sym_addrs(elf.as_ref())?;
        self.openssl_symaddrs_map.update_value(pid, symaddrs);

        if !state.openssl_probed_binaries.insert(container_libssl.clone()) {
            return Ok(0);
        }

        for (symbol, attach_type, probe_fn) in OPENSSL_UPROBES {
            let spec = UProbeSpec {
                binary_path: container_libssl.clone(),
                symbol: (*symbol).to_string(),
                address: 0,
                pid: UProbeSpec::ANY_PID,
                attach_type: *attach_type,
                probe_fn: (*probe_fn).to_string(),
            };
            self.attacher.attach_uprobe(&spec)?;
        }
        Ok(OPENSSL_UPROBES.len())
    }

    /// Find the host paths for `lib_names` as mapped into `pid`'s
    /// address space. A library that isn't mapped yields an empty path
    /// at its index rather than an error.
    fn find_library_paths(&self, state: &mut DeployState, lib_names: &[&str], pid: u32) -> CoreResult<Vec<PathBuf>> {
        state.fp_resolver.set_mount_namespace(pid)?;
        let mapped_lib_paths = state.proc_maps.mapped_paths(pid)?;

        let mut result = vec![PathBuf::new(); lib_names.len()];
        let mut found = vec![false; lib_names.len()];

        for mapped_lib_path in &mapped_lib_paths {
            for (idx, lib_name) in lib_names.iter().enumerate() {
                if found[idx] || !mapped_lib_path.ends_with(lib_name) {
                    continue;
                }
                if let Ok(resolved) = state.fp_resolver.resolve_path(mapped_lib_path) {
                    result[idx] = resolved;
                    found[idx] = true;
                }
            }
        }
        Ok(result)
    }

    fn deploy_go_uprobes(&self, state: &mut DeployState, upids: &HashSet<Upid>) -> usize {
        let mut uprobe_count = 0;
        let pids_by_binary = self.convert_upids_to_binary_map(state, upids);

        for (binary, pid_vec) in pids_by_binary {
            if !state.scanned_binaries.insert(binary.clone()) {
                continue;
            }
            if self.disable_self_probing && pid_vec.len() == 1 && pid_vec[0] == self.self_pid {
                continue;
            }

            let elf = match self.elf_reader_factory.open(&binary) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(binary = %binary.display(), error = %e, "cannot analyze binary for uprobe deployment");
                    continue;
                }
            };

            if elf.symbol_address("runtime.buildVersion").is_none() {
                continue;
            }

            if let Err(e) = self.update_go_common_sym_addrs(elf.as_ref(), &pid_vec) {
                tracing::debug!(binary = %binary.display(), error = %e, "golang binary does not have the mandatory symbols");
                continue;
            }

            match self.attach_go_tls_uprobes(state, &binary, elf.as_ref(), &pid_vec) {
                Ok(n) => uprobe_count += n,
                Err(e) => tracing::warn!(binary = %binary.display(), error = %e, "failed to attach GoTLS uprobes"),
            }

            if self.enable_http2_tracing {
                match self.attach_go_http2_uprobes(state, &binary, elf.as_ref(), &pid_vec) {
                    Ok(n) => uprobe_count += n,
                    Err(e) => tracing::warn!(binary = %binary.display(), error = %e, "failed to attach HTTP2 uprobes"),
                }
            }
        }

        uprobe_count
    }

    fn update_go_common_sym_addrs(&self, elf: &dyn ElfSymbolReader, pids: &[u32]) -> CoreResult<()> {
        let symaddrs = resolve_go_common_sym_addrs(elf)?;
        for pid in pids {
            self.go_common_symaddrs_map.update_value(*pid, symaddrs);
        }
        Ok(())
    }

    fn attach_go_tls_uprobes(
        &self,
        state: &mut DeployState,
        binary: &Path,
        elf: &dyn ElfSymbolReader,
        pids: &[u32],
    ) -> CoreResult<usize> {
        let symaddrs = match resolve_go_tls_sym_addrs(elf) {
            Ok(s) => s,
            // Doesn't have the mandatory TLS symbols; not an error, just not
            // a candidate for these probes.
            Err(_) => return Ok(0),
        };
        for pid in pids {
            self.go_tls_symaddrs_map.update_value(*pid, symaddrs);
        }

        if !state.go_tls_probed_binaries.insert(binary.to_path_buf()) {
            return Ok(0);
        }
        attach_uprobe_tmpl(elf, self.attacher.as_ref(), binary, GO_TLS_UPROBE_TMPLS)
    }

    fn attach_go_http2_uprobes(
        &self,
        state: &mut DeployState,
        binary: &Path,
        elf: &dyn ElfSymbolReader,
        pids: &[u32],
    ) -> CoreResult<usize> {
        let symaddrs = match resolve_go_http2_sym_addrs(elf) {
            Ok(s) => s,
            Err(_) => return Ok(0),
        };
        for pid in pids {
            self.go_http2_symaddrs_map.update_value(*pid, symaddrs);
        }

        if !state.go_http2_probed_binaries.insert(binary.to_path_buf()) {
            return Ok(0);
        }
        attach_uprobe_tmpl(elf, self.attacher.as_ref(), binary, HTTP2_PROBE_TMPLS)
    }

    /// Resolve each upid to its host executable path, grouping by
    /// binary so a multi-process binary is only scanned/probed once.
    fn convert_upids_to_binary_map(&self, state: &mut DeployState, upids: &HashSet<Upid>) -> HashMap<PathBuf, Vec<u32>> {
        let mut pids: HashMap<PathBuf, Vec<u32>> = HashMap::new();

        for upid in upids {
            let proc_exe = match state.proc_maps.exe_path(upid.pid) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if state.fp_resolver.set_mount_namespace(upid.pid).is_err() {
                continue;
            }
            let exe_path = match state.fp_resolver.resolve_path(&proc_exe.to_string_lossy()) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !self.host_fs.exists(&exe_path) {
                continue;
            }
            pids.entry(exe_path).or_default().push(upid.pid);
        }

        pids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uprobe::collaborators::fakes::{
        FakeBpfAttacher, FakeElfReaderFactory, FakeElfSymbolReader, FakeHostFs, FakeMountNamespaceResolver,
        FakeProcMapsReader,
    };
    use crate::uprobe::collaborators::SymbolInfo;

    fn upid(pid: u32) -> Upid {
        Upid::new(1, pid, 0)
    }

    fn openssl_fixture_with_cfg(pid: u32, cfg: &UProbeConfig) -> UProbeManager {
        let libssl = PathBuf::from("/host/libssl.so.1.1");
        let libcrypto = PathBuf::from("/host/libcrypto.so.1.1");

        let mut proc_maps = FakeProcMapsReader::default();
        proc_maps.maps.insert(
            pid,
            HashSet::from(["/usr/lib/libssl.so.1.1".to_string(), "/usr/lib/libcrypto.so.1.1".to_string()]),
        );

        let mut fp_resolver = FakeMountNamespaceResolver::default();
        fp_resolver.resolutions.insert((pid, "/usr/lib/libssl.so.1.1".to_string()), libssl.clone());
        fp_resolver
            .resolutions
            .insert((pid, "/usr/lib/libcrypto.so.1.1".to_string()), libcrypto.clone());

        let mut host_fs = FakeHostFs::default();
        host_fs.present.insert(libssl.clone());
        host_fs.present.insert(libcrypto.clone());

        let mut elf_factory = FakeElfReaderFactory::default();
        elf_factory.binaries.insert(
            libcrypto,
            FakeElfSymbolReader {
                symbols: vec![
                    SymbolInfo {
                        name: "SSL_write".to_string(),
                        address: 0x100,
                    },
                    SymbolInfo {
                        name: "SSL_read".to_string(),
                        address: 0x200,
                    },
                ],
                ..Default::default()
            },
        );

        UProbeManager::new(
            cfg,
            Box::new(elf_factory),
            Box::new(FakeBpfAttacher::default()),
            Box::new(fp_resolver),
            Box::new(proc_maps),
            Box::new(host_fs),
            999_999,
        )
    }

    fn openssl_fixture(pid: u32) -> UProbeManager {
        openssl_fixture_with_cfg(pid, &UProbeConfig::default())
    }

    #[test]
    fn deploy_attaches_openssl_uprobes_once_per_binary() {
        let manager = openssl_fixture(42);
        let report = manager.deploy_uprobes(&HashSet::from([upid(42)]));
        assert_eq!(report.uprobe_count, OPENSSL_UPROBES.len());

        // A second deploy with the same pid set finds nothing new.
        let report2 = manager.deploy_uprobes(&HashSet::from([upid(42)]));
        assert_eq!(report2.uprobe_count, 0);
    }

    #[test]
    fn process_without_mapped_openssl_libs_attaches_nothing() {
        let manager = UProbeManager::new(
            &UProbeConfig::default(),
            Box::new(FakeElfReaderFactory::default()),
            Box::new(FakeBpfAttacher::default()),
            Box::new(FakeMountNamespaceResolver::default()),
            Box::new(FakeProcMapsReader::default()),
            Box::new(FakeHostFs::default()),
            999_999,
        );
        let report = manager.deploy_uprobes(&HashSet::from([upid(7)]));
        assert_eq!(report.uprobe_count, 0);
    }

    #[test]
    fn cleanup_runs_for_departed_pids_on_next_deploy() {
        let manager = openssl_fixture(42);
        manager.deploy_uprobes(&HashSet::from([upid(42)]));
        // pid 42 departs; this should not panic and should clean up its
        // symaddr map entries without re-attaching anything.
        let report = manager.deploy_uprobes(&HashSet::new());
        assert_eq!(report.uprobe_count, 0);
    }

    #[test]
    fn disable_self_probing_skips_own_pid() {
        let cfg = UProbeConfig {
            disable_self_probing: true,
            ..UProbeConfig::default()
        };
        let manager = openssl_fixture_with_cfg(999_999, &cfg);
        let report = manager.deploy_uprobes(&HashSet::from([upid(999_999)]));
        assert_eq!(report.uprobe_count, 0);
    }

    #[test]
    fn spawn_deploy_runs_in_background_and_tracks_in_flight_count() {
        let manager = Arc::new(openssl_fixture(42));
        assert_eq!(manager.num_deploy_threads(), 0);
        let handle = manager.spawn_deploy(HashSet::from([upid(42)]));
        let report = handle.join().unwrap();
        assert_eq!(report.uprobe_count, OPENSSL_UPROBES.len());
        assert_eq!(manager.num_deploy_threads(), 0);
    }
}
