//! Uprobe specs and attach templates.
//!
//! Grounded on `uprobe_manager.cc`'s `UProbeTmpl`/`UProbeSpec` usage and
//! `AttachUProbeTmpl`'s dispatch over attach kinds, including the
//! `ReturnInsts` disassembly workaround for uretprobes Go binaries
//! don't reliably support.

use std::path::PathBuf;

use crate::error::CoreResult;
use crate::uprobe::collaborators::{BpfAttacher, ElfSymbolReader};

/// How a uprobe's entry point is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachType {
    /// Attach at the function's entry point.
    Entry,
    /// Attach a uretprobe at the function's return.
    Return,
    /// Disassemble the function and attach an entry-type probe at
    /// every `ret` instruction found, instead of a uretprobe. Some
    /// kernel/arch combinations can't attach uretprobes to Go
    /// functions reliably.
    ReturnInsts,
}

/// How a symbol pattern is matched against a binary's symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
    Suffix,
}

/// A fully-resolved probe ready to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UProbeSpec {
    pub binary_path: PathBuf,
    pub symbol: String,
    pub address: u64,
    pub pid: Option<u32>,
    pub attach_type: AttachType,
    pub probe_fn: String,
}

impl UProbeSpec {
    /// Sentinel meaning "attach system-wide, not to one pid", mirroring
    /// `bpf_tools::UProbeSpec::kDefaultPID`.
    pub const ANY_PID: Option<u32> = None;
}

/// A template that still needs symbol resolution against a specific
/// binary's ELF symbol table.
#[derive(Debug, Clone, Copy)]
pub struct UProbeTmpl {
    pub symbol: &'static str,
    pub match_kind: MatchKind,
    pub attach_type: AttachType,
    pub probe_fn: &'static str,
}

/// Fixed OpenSSL probe points: `SSL_write`/`SSL_read` are exact symbol
/// names with no pattern matching needed, mirroring `kOpenSSLUProbes`.
pub const OPENSSL_UPROBES: &[(&str, AttachType, &str)] = &[
    ("SSL_write", AttachType::Entry, "probe_entry_SSL_write"),
    ("SSL_write", AttachType::Return, "probe_ret_SSL_write"),
    ("SSL_read", AttachType::Entry, "probe_entry_SSL_read"),
    ("SSL_read", AttachType::Return, "probe_ret_SSL_read"),
];

pub const GO_TLS_UPROBE_TMPLS: &[UProbeTmpl] = &[
    UProbeTmpl {
        symbol: "crypto/tls.(*Conn).Write",
        match_kind: MatchKind::Exact,
        attach_type: AttachType::Entry,
        probe_fn: "probe_entry_go_tls_write",
    },
    UProbeTmpl {
        symbol: "crypto/tls.(*Conn).Write",
        match_kind: MatchKind::Exact,
        attach_type: AttachType::ReturnInsts,
        probe_fn: "probe_ret_go_tls_write",
    },
    UProbeTmpl {
        symbol: "crypto/tls.(*Conn).Read",
        match_kind: MatchKind::Exact,
        attach_type: AttachType::Entry,
        probe_fn: "probe_entry_go_tls_read",
    },
    UProbeTmpl {
        symbol: "crypto/tls.(*Conn).Read",
        match_kind: MatchKind::Exact,
        attach_type: AttachType::ReturnInsts,
        probe_fn: "probe_ret_go_tls_read",
    },
];

pub const HTTP2_PROBE_TMPLS: &[UProbeTmpl] = &[
    UProbeTmpl {
        symbol: "golang.org/x/net/http2.(*Framer).WriteDataPadded",
        match_kind: MatchKind::Exact,
        attach_type: AttachType::Entry,
        probe_fn: "probe_entry_http2_write_data",
    },
    UProbeTmpl {
        symbol: "golang.org/x/net/http2.(*Framer).ReadFrame",
        match_kind: MatchKind::Exact,
        attach_type: AttachType::ReturnInsts,
        probe_fn: "probe_ret_http2_read_frame",
    },
];

/// Resolve each template's symbol pattern against `binary`'s symbol
/// table and attach a probe per match, per `AttachType`. Returns the
/// number of probes attached; a template whose pattern matches nothing
/// contributes 0, not an error.
pub fn attach_uprobe_tmpl(
    elf_reader: &dyn ElfSymbolReader,
    attacher: &dyn BpfAttacher,
    binary: &std::path::Path,
    tmpls: &[UProbeTmpl],
) -> CoreResult<usize> {
    let mut uprobe_count = 0;
    for tmpl in tmpls {
        let symbol_infos = match elf_reader.list_func_symbols(tmpl.symbol, tmpl.match_kind) {
            Ok(infos) => infos,
            Err(e) => {
                tracing::debug!(symbol = tmpl.symbol, error = %e, "could not list symbols");
                continue;
            }
        };

        for symbol_info in &symbol_infos {
            match tmpl.attach_type {
                AttachType::Entry | AttachType::Return => {
                    let spec = UProbeSpec {
                        binary_path: binary.to_path_buf(),
                        symbol: symbol_info.name.clone(),
                        address: 0,
                        pid: UProbeSpec::ANY_PID,
                        attach_type: tmpl.attach_type,
                        probe_fn: tmpl.probe_fn.to_string(),
                    };
                    attacher.attach_uprobe(&spec)?;
                    uprobe_count += 1;
                }
                AttachType::ReturnInsts => {
                    let ret_inst_addrs = elf_reader.func_ret_inst_addrs(symbol_info)?;
                    for addr in ret_inst_addrs {
                        let spec = UProbeSpec {
                            binary_path: binary.to_path_buf(),
                            symbol: symbol_info.name.clone(),
                            address: addr,
                            pid: UProbeSpec::ANY_PID,
                            attach_type: AttachType::Entry,
                            probe_fn: tmpl.probe_fn.to_string(),
                        };
                        attacher.attach_uprobe(&spec)?;
                        uprobe_count += 1;
                    }
                }
            }
        }
    }
    Ok(uprobe_count)
}
