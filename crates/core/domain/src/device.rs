//! 设备领域模型：标识、类型、生命周期状态。

use std::fmt;
use std::net::SocketAddr;

/// 设备唯一标识（设备清单中的 hardwareId，进程生命周期内不变）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DeviceId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// 设备类型（由设备编码前缀推导，封闭枚举）。
///
/// 编码约定：`<前缀>-<序号>`，如 `DIBANG-001`、`RFID-002`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// 智能电表 `DIANBIAO`
    ElectricityMeter,
    /// 智能水表 `SHUIBIAO`
    WaterMeter,
    /// 塔吊 `TADIAO`
    TowerCrane,
    /// 污水监测 `WUSHUI`
    Sewage,
    /// 环境监测 `ENV`
    Environment,
    /// 噪音监测 `ZAOYIN`
    Noise,
    /// RFID 识别器 `RFID`
    RfidReader,
    /// 电梯 `DIANTI`
    Elevator,
    /// 地磅（D39 帧格式）`DIBANG`
    WeighScale,
    /// 智能地磅（带起始标记字节）`ZNDIBANG`
    SmartWeighScale,
    /// 摄像头 `SHEXIANGTOU`
    Camera,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 11] = [
        DeviceKind::ElectricityMeter,
        DeviceKind::WaterMeter,
        DeviceKind::TowerCrane,
        DeviceKind::Sewage,
        DeviceKind::Environment,
        DeviceKind::Noise,
        DeviceKind::RfidReader,
        DeviceKind::Elevator,
        DeviceKind::WeighScale,
        DeviceKind::SmartWeighScale,
        DeviceKind::Camera,
    ];

    /// 从设备编码解析类型（取第一个 `-` 之前的前缀）。
    pub fn from_code(code: &str) -> Option<Self> {
        let prefix = code.split('-').next()?.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.prefix().eq_ignore_ascii_case(prefix))
    }

    /// 设备编码前缀。
    pub fn prefix(self) -> &'static str {
        match self {
            DeviceKind::ElectricityMeter => "DIANBIAO",
            DeviceKind::WaterMeter => "SHUIBIAO",
            DeviceKind::TowerCrane => "TADIAO",
            DeviceKind::Sewage => "WUSHUI",
            DeviceKind::Environment => "ENV",
            DeviceKind::Noise => "ZAOYIN",
            DeviceKind::RfidReader => "RFID",
            DeviceKind::Elevator => "DIANTI",
            DeviceKind::WeighScale => "DIBANG",
            DeviceKind::SmartWeighScale => "ZNDIBANG",
            DeviceKind::Camera => "SHEXIANGTOU",
        }
    }

    /// 日志用的类型名。
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::ElectricityMeter => "electricity_meter",
            DeviceKind::WaterMeter => "water_meter",
            DeviceKind::TowerCrane => "tower_crane",
            DeviceKind::Sewage => "sewage",
            DeviceKind::Environment => "environment",
            DeviceKind::Noise => "noise",
            DeviceKind::RfidReader => "rfid_reader",
            DeviceKind::Elevator => "elevator",
            DeviceKind::WeighScale => "weigh_scale",
            DeviceKind::SmartWeighScale => "smart_weigh_scale",
            DeviceKind::Camera => "camera",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 设备生命周期状态。
///
/// 上报编码沿用现场约定：0 在线、1 断开、2 无数据。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    Online,
    #[default]
    Offline,
    NoData,
}

impl LifecycleState {
    pub fn code(self) -> u8 {
        match self {
            LifecycleState::Online => 0,
            LifecycleState::Offline => 1,
            LifecycleState::NoData => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Online => "online",
            LifecycleState::Offline => "offline",
            LifecycleState::NoData => "no_data",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 设备配合状态（isOk）：1 正常，0 未按时返回数据。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandStatus {
    #[default]
    Cooperating,
    NotResponding,
}

impl CommandStatus {
    pub fn code(self) -> u8 {
        match self {
            CommandStatus::Cooperating => 1,
            CommandStatus::NotResponding => 0,
        }
    }
}

/// 设备清单中的一条记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: DeviceId,
    pub port: u16,
    pub code: String,
}

/// 设备当前状态快照（注册表对外只暴露快照）。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub port: u16,
    pub kind: DeviceKind,
    pub code: String,
    pub state: LifecycleState,
    pub command: CommandStatus,
    /// 当前绑定连接的对端地址，未绑定时为 None。
    pub peer: Option<SocketAddr>,
    pub last_value: Option<String>,
    pub last_report_ms: Option<i64>,
}

impl DeviceSnapshot {
    pub fn is_bound(&self) -> bool {
        self.peer.is_some()
    }
}
