//! 设备清单来源
//!
//! 远端接口返回格式：
//!
//! ```json
//! { "code": 200,
//!   "data": [ { "area": "大门", "hardwareCode": "RFID-001", "hardwareId": 3,
//!               "name": "RFID读卡器", "port": 10003 } ],
//!   "errMsg": "" }
//! ```

use crate::DiscoveryError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

/// 清单中的一条设备记录（未校验）。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub hardware_id: u64,
    pub hardware_code: String,
    pub port: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub area: String,
}

impl CatalogRecord {
    pub fn new(hardware_id: u64, hardware_code: impl Into<String>, port: i64) -> Self {
        Self {
            hardware_id,
            hardware_code: hardware_code.into(),
            port,
            name: String::new(),
            area: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogResponse {
    code: i64,
    #[serde(default)]
    data: Option<Vec<CatalogRecord>>,
    #[serde(default)]
    err_msg: Option<String>,
}

/// 解析清单响应体；`code` 非 200 视为服务端错误。
pub fn parse_catalog(body: &[u8]) -> Result<Vec<CatalogRecord>, DiscoveryError> {
    let response: CatalogResponse =
        serde_json::from_slice(body).map_err(|err| DiscoveryError::Payload(err.to_string()))?;
    if response.code != 200 {
        return Err(DiscoveryError::Server {
            code: response.code,
            message: response.err_msg.unwrap_or_default(),
        });
    }
    Ok(response.data.unwrap_or_default())
}

/// 设备清单来源抽象。
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CatalogRecord>, DiscoveryError>;
}

/// 基于 reqwest 的清单来源（GET）。
#[derive(Clone)]
pub struct HttpCatalogSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCatalogSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fieldgw/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| DiscoveryError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self) -> Result<Vec<CatalogRecord>, DiscoveryError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| DiscoveryError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Transport(format!("http status {}", status)));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| DiscoveryError::Transport(err.to_string()))?;
        parse_catalog(&body)
    }
}

/// 固定清单来源（用于测试与离线部署），可在运行中替换内容。
#[derive(Debug, Default)]
pub struct StaticCatalogSource {
    records: Mutex<Vec<CatalogRecord>>,
}

impl StaticCatalogSource {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn replace(&self, records: Vec<CatalogRecord>) {
        if let Ok(mut current) = self.records.lock() {
            *current = records;
        }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch(&self) -> Result<Vec<CatalogRecord>, DiscoveryError> {
        self.records
            .lock()
            .map(|records| records.clone())
            .map_err(|_| DiscoveryError::Payload("static catalog poisoned".to_string()))
    }
}
