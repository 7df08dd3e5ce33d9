//! # 设备注册表
//!
//! 进程内唯一的设备表：设备标识 → 声明端口、类型、当前连接绑定与生命周期状态。
//!
//! 所有读写都经过同一把 `RwLock`，全表扫描（状态上报）与绑定/解绑互斥，
//! 不会读到撕裂的中间状态。
//!
//! ## 连接绑定
//!
//! ```text
//! Acceptor ── bind(id, peer) ──▶ Binding { lease(generation), evicted }
//!                                   │
//!                                   ▼
//!                           Session 持有 socket
//!                                   │
//!            release(lease) ◀───────┘   （generation 不匹配时不生效）
//! ```
//!
//! 同一设备再次 `bind` 时旧绑定的驱逐发送端被丢弃，旧会话随即退出；
//! 旧会话随后的 `release` 与命令状态标记都因 generation 过期而不会影响新连接。

use domain::{CatalogEntry, CommandStatus, DeviceId, DeviceKind, DeviceSnapshot, LifecycleState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// 绑定租约：设备标识 + 绑定代次。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub device_id: DeviceId,
    pub generation: u64,
}

/// 一次成功绑定的结果，交给会话持有。
#[derive(Debug)]
pub struct Binding {
    pub lease: Lease,
    pub peer: SocketAddr,
    /// 绑定被替换或被解除时完成（发送端被丢弃）。
    pub evicted: oneshot::Receiver<()>,
}

struct ConnectionSlot {
    generation: u64,
    peer: SocketAddr,
    // 仅用于在 drop 时唤醒会话，从不发送。
    _evict: oneshot::Sender<()>,
}

struct DeviceEntry {
    port: u16,
    kind: DeviceKind,
    code: String,
    state: LifecycleState,
    command: CommandStatus,
    connection: Option<ConnectionSlot>,
    last_value: Option<String>,
    last_report_ms: Option<i64>,
}

impl DeviceEntry {
    fn snapshot(&self, id: DeviceId) -> DeviceSnapshot {
        DeviceSnapshot {
            id,
            port: self.port,
            kind: self.kind,
            code: self.code.clone(),
            state: self.state,
            command: self.command,
            peer: self.connection.as_ref().map(|slot| slot.peer),
            last_value: self.last_value.clone(),
            last_report_ms: self.last_report_ms,
        }
    }

    fn clear_connection(&mut self) -> bool {
        self.state = LifecycleState::Offline;
        self.connection.take().is_some()
    }
}

#[derive(Default)]
struct Table {
    devices: HashMap<DeviceId, DeviceEntry>,
    next_generation: u64,
}

/// 设备注册表。
#[derive(Default)]
pub struct DeviceRegistry {
    table: RwLock<Table>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // 每个操作都在持锁期间完成全部修改，中毒后的数据仍然一致，直接接管。
    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记设备；已存在时不做任何修改，返回 false。
    pub fn register(&self, entry: &CatalogEntry, kind: DeviceKind) -> bool {
        let mut table = self.write();
        if table.devices.contains_key(&entry.id) {
            return false;
        }
        table.devices.insert(
            entry.id,
            DeviceEntry {
                port: entry.port,
                kind,
                code: entry.code.clone(),
                state: LifecycleState::Offline,
                command: CommandStatus::Cooperating,
                connection: None,
                last_value: None,
                last_report_ms: None,
            },
        );
        info!(
            target: "fieldgw.registry",
            device_id = %entry.id,
            port = entry.port,
            kind = %kind,
            code = %entry.code,
            "device_registered"
        );
        true
    }

    pub fn lookup(&self, id: DeviceId) -> Option<DeviceSnapshot> {
        self.read()
            .devices
            .get(&id)
            .map(|entry| entry.snapshot(id))
    }

    pub fn len(&self) -> usize {
        self.read().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 全表快照（按设备标识排序）。
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        let table = self.read();
        let mut devices = table
            .devices
            .iter()
            .map(|(id, entry)| entry.snapshot(*id))
            .collect::<Vec<_>>();
        drop(table);
        devices.sort_by_key(|device| device.id);
        devices
    }

    /// 绑定新连接并置为在线；旧绑定（如有）随之失效。
    pub fn bind(&self, id: DeviceId, peer: SocketAddr) -> Option<Binding> {
        let mut table = self.write();
        if !table.devices.contains_key(&id) {
            drop(table);
            warn!(target: "fieldgw.registry", device_id = %id, peer = %peer, "bind_unknown_device");
            return None;
        }
        table.next_generation = table.next_generation.wrapping_add(1);
        let generation = table.next_generation;
        let entry = table.devices.get_mut(&id)?;
        let (evict, evicted) = oneshot::channel();
        let replaced = entry.connection.replace(ConnectionSlot {
            generation,
            peer,
            _evict: evict,
        });
        entry.state = LifecycleState::Online;
        drop(table);

        if let Some(previous) = replaced {
            info!(
                target: "fieldgw.registry",
                device_id = %id,
                previous_peer = %previous.peer,
                peer = %peer,
                "connection_replaced"
            );
        }
        Some(Binding {
            lease: Lease {
                device_id: id,
                generation,
            },
            peer,
            evicted,
        })
    }

    /// 无条件解除绑定并置为断开。
    pub fn unbind(&self, id: DeviceId) -> bool {
        let mut table = self.write();
        let Some(entry) = table.devices.get_mut(&id) else {
            drop(table);
            warn!(target: "fieldgw.registry", device_id = %id, "unbind_unknown_device");
            return false;
        };
        entry.clear_connection()
    }

    /// 会话退出时归还租约；仅当租约仍是当前绑定时才解绑。
    pub fn release(&self, lease: &Lease) -> bool {
        let mut table = self.write();
        let Some(entry) = table.devices.get_mut(&lease.device_id) else {
            drop(table);
            warn!(target: "fieldgw.registry", device_id = %lease.device_id, "release_unknown_device");
            return false;
        };
        let current = entry
            .connection
            .as_ref()
            .is_some_and(|slot| slot.generation == lease.generation);
        if !current {
            drop(table);
            debug!(
                target: "fieldgw.registry",
                device_id = %lease.device_id,
                generation = lease.generation,
                "release_stale_lease"
            );
            return false;
        }
        entry.clear_connection()
    }

    /// 设备未按时返回数据：isOk=0，在线 → 无数据。租约过期（含已断开）时不生效。
    pub fn mark_command_failure(&self, lease: &Lease) -> bool {
        self.update_current(lease, |entry| {
            entry.command = CommandStatus::NotResponding;
            if entry.state == LifecycleState::Online {
                entry.state = LifecycleState::NoData;
            }
        })
    }

    /// 设备返回数据：isOk=1，无数据 → 在线。租约过期（含已断开）时不生效。
    pub fn mark_command_ok(&self, lease: &Lease) -> bool {
        self.update_current(lease, |entry| {
            entry.command = CommandStatus::Cooperating;
            if entry.state == LifecycleState::NoData {
                entry.state = LifecycleState::Online;
            }
        })
    }

    /// 记录最近一次上报的读数（仅供查看，不参与判定）。
    pub fn record_reading(&self, id: DeviceId, value: &str, ts_ms: i64) -> bool {
        let mut table = self.write();
        let Some(entry) = table.devices.get_mut(&id) else {
            drop(table);
            warn!(target: "fieldgw.registry", device_id = %id, "record_unknown_device");
            return false;
        };
        entry.last_value = Some(value.to_string());
        entry.last_report_ms = Some(ts_ms);
        true
    }

    fn update_current(&self, lease: &Lease, update: impl FnOnce(&mut DeviceEntry)) -> bool {
        let mut table = self.write();
        let Some(entry) = table.devices.get_mut(&lease.device_id) else {
            drop(table);
            warn!(target: "fieldgw.registry", device_id = %lease.device_id, "mark_unknown_device");
            return false;
        };
        let current = entry
            .connection
            .as_ref()
            .is_some_and(|slot| slot.generation == lease.generation);
        if !current {
            drop(table);
            debug!(
                target: "fieldgw.registry",
                device_id = %lease.device_id,
                generation = lease.generation,
                "mark_stale_lease"
            );
            return false;
        }
        update(entry);
        true
    }
}
