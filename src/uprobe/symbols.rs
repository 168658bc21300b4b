//! Kernel-side symbol address maps.
//!
//! The real agent pushes these structs into BPF maps keyed by pid so
//! the in-kernel probes know which struct offsets to read off a given
//! process's memory. This crate has no kernel to push into, so
//! `SymbolMap` is a trait over that contract (insert on new process,
//! remove on departure) backed by an in-process `DashMap`
//! (`UserManagedMap`) — the seam a real agent would swap for a
//! `libbpf-rs`-backed map.
//!
//! The symaddrs struct field names below are a reconstruction: the
//! pack's `original_source/` includes `uprobe_manager.cc` but not
//! `symaddrs.h`/`uprobe_symaddrs.h`, so the exact struct layouts
//! aren't available. What's preserved exactly is the contract each
//! `Update*SymAddrs` function follows: resolve required symbols/struct
//! offsets for one binary, and if any are missing, fail without
//! touching the map (the binary isn't a candidate for these probes).

use dashmap::DashMap;
use std::hash::Hash;

use crate::error::CoreResult;
use crate::uprobe::collaborators::ElfSymbolReader;

/// Contract for a kernel-side symbol address map keyed by pid (or
/// similar integer key).
pub trait SymbolMap<K, V> {
    fn update_value(&self, key: K, value: V);
    fn remove_value(&self, key: &K);
    fn get(&self, key: &K) -> Option<V>;
}

/// `DashMap`-backed stand-in for a BPF hash map.
#[derive(Debug, Default)]
pub struct UserManagedMap<K, V>
where
    K: Eq + Hash,
{
    inner: DashMap<K, V>,
}

impl<K, V> UserManagedMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        UserManagedMap { inner: DashMap::new() }
    }
}

impl<K, V> SymbolMap<K, V> for UserManagedMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn update_value(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    fn remove_value(&self, key: &K) {
        self.inner.remove(key);
    }

    fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|v| v.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenSslSymAddrs {
    pub ssl_write_addr: u64,
    pub ssl_read_addr: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoCommonSymAddrs {
    pub tcp_conn_fd_offset: i64,
    pub conn_fd_sysfd_offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoTlsSymAddrs {
    pub conn_conn_offset: i64,
    pub conn_raw_input_offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoHttp2SymAddrs {
    pub framer_w_offset: i64,
}

/// Resolve the handful of symbols OpenSSL uprobes need out of
/// `libcrypto`. Mandatory, so a binary missing either symbol isn't
/// OpenSSL-instrumentable.
pub fn resolve_openssl_sym_addrs(elf: &dyn ElfSymbolReader) -> CoreResult<OpenSslSymAddrs> {
    let ssl_write_addr = elf.symbol_address("SSL_write").ok_or_else(|| crate::error::CoreError::NotFound {
        message: "SSL_write not found".to_string(),
    })?;
    let ssl_read_addr = elf.symbol_address("SSL_read").ok_or_else(|| crate::error::CoreError::NotFound {
        message: "SSL_read not found".to_string(),
    })?;
    Ok(OpenSslSymAddrs {
        ssl_write_addr,
        ssl_read_addr,
    })
}

pub fn resolve_go_common_sym_addrs(elf: &dyn ElfSymbolReader) -> CoreResult<GoCommonSymAddrs> {
    Ok(GoCommonSymAddrs {
        tcp_conn_fd_offset: elf.struct_member_offset("net.TCPConn", "conn.fd")?,
        conn_fd_sysfd_offset: elf.struct_member_offset("net.netFD", "pfd.Sysfd")?,
    })
}

pub fn resolve_go_tls_sym_addrs(elf: &dyn ElfSymbolReader) -> CoreResult<GoTlsSymAddrs> {
    Ok(GoTlsSymAddrs {
        conn_conn_offset: elf.struct_member_offset("crypto/tls.Conn", "conn")?,
        conn_raw_input_offset: elf.struct_member_offset("crypto/tls.Conn", "rawInput")?,
    })
}

pub fn resolve_go_http2_sym_addrs(elf: &dyn ElfSymbolReader) -> CoreResult<GoHttp2SymAddrs> {
    Ok(GoHttp2SymAddrs {
        framer_w_offset: elf.struct_member_offset("http2.Framer", "w")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_and_remove_round_trips() {
        let map: UserManagedMap<u32, OpenSslSymAddrs> = UserManagedMap::new();
        let addrs = OpenSslSymAddrs {
            ssl_write_addr: 1,
            ssl_read_addr: 2,
        };
        map.update_value(42, addrs);
        assert_eq!(map.get(&42), Some(addrs));
        map.remove_value(&42);
        assert_eq!(map.get(&42), None);
    }
}
