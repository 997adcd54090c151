use serde::{Deserialize, Serialize};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含：
/// - server: 服务器地址、端口、CPU 数量
/// - database: 数据库连接与重试配置
/// - logging: 日志配置
/// - tracking: 点击摄入与富化配置
/// - postback: 回传投递引擎配置
/// - api: 投递日志接口配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub postback: PostbackConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl StaticConfig {
    /// 从默认路径加载
    pub fn load() -> Self {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：CT，分隔符：__
    /// 示例：CT__SERVER__PORT=9999
    pub fn load_from(path: &str) -> Self {
        use config::{Config, Environment, File};

        let builder = Config::builder()
            // 1. 从 TOML 文件加载（可选）
            .add_source(File::with_name(path).required(false))
            // 2. 从环境变量覆盖，前缀 CT，分隔符 __
            .add_source(
                Environment::with_prefix("CT")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 点击摄入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// 无法从 offer 解析落地页时的兜底跳转地址
    #[serde(default)]
    pub default_landing_url: Option<String>,

    /// 自动生成 clickid 的长度（最少 16）
    #[serde(default = "default_click_id_length")]
    pub click_id_length: usize,

    /// sub2 结构化格式 `key-value|key2-value2` 允许的 key
    #[serde(default = "default_sub2_allowed_keys")]
    pub sub2_allowed_keys: Vec<String>,

    /// 可信代理列表（IP 或 CIDR），为空时自动信任私有地址
    #[serde(default)]
    pub trusted_proxies: Vec<String>,

    /// 是否进行 GeoIP 查询
    #[serde(default = "default_enable_geo_lookup")]
    pub enable_geo_lookup: bool,

    /// MaxMindDB 文件路径 (GeoLite2-City.mmdb)
    /// 如果配置且文件可读，使用本地解析；否则 fallback 到外部 API
    #[serde(default)]
    pub maxminddb_path: Option<String>,

    /// 外部 GeoIP API URL (fallback)
    /// 使用 {ip} 作为占位符
    #[serde(default = "default_geoip_api_url")]
    pub geoip_api_url: String,
}

/// 回传投递配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostbackConfig {
    /// profile 未设置 timeout_ms 时使用
    #[serde(default = "default_postback_timeout_ms")]
    pub default_timeout_ms: u64,

    /// 退避抖动上限（相对延迟的比例）
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// 重试队列轮询间隔
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 每次轮询最多领取的任务数
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: u64,

    /// 响应体截断长度（字符）
    #[serde(default = "default_response_body_limit")]
    pub response_body_limit: usize,

    /// 出站请求 User-Agent
    #[serde(default = "default_postback_user_agent")]
    pub user_agent: String,

    /// 关闭时等待在途请求的最长时间
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

/// 投递日志接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bearer token，为空时禁用投递日志接口
    #[serde(default)]
    pub admin_token: String,

    #[serde(default = "default_postback_prefix")]
    pub postback_prefix: String,
}

// ============================================================
// Default value functions
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_database_url() -> String {
    "clicktrail.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_click_id_length() -> usize {
    24
}

fn default_sub2_allowed_keys() -> Vec<String> {
    [
        "gclid",
        "fbclid",
        "ttclid",
        "adset",
        "ad",
        "creative",
        "placement",
        "keyword",
        "site",
        "pixel",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_enable_geo_lookup() -> bool {
    true
}

fn default_geoip_api_url() -> String {
    "http://ip-api.com/json/{ip}?fields=status,countryCode,regionName,city,isp,proxy".to_string()
}

fn default_postback_timeout_ms() -> u64 {
    4000
}

fn default_jitter_ratio() -> f64 {
    0.2
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_batch_size() -> u64 {
    100
}

fn default_response_body_limit() -> usize {
    2048
}

fn default_postback_user_agent() -> String {
    format!("clicktrail-postback/{}", env!("CARGO_PKG_VERSION"))
}

fn default_drain_timeout_secs() -> u64 {
    10
}

fn default_postback_prefix() -> String {
    "/postback".to_string()
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            default_landing_url: None,
            click_id_length: default_click_id_length(),
            sub2_allowed_keys: default_sub2_allowed_keys(),
            trusted_proxies: Vec::new(),
            enable_geo_lookup: default_enable_geo_lookup(),
            maxminddb_path: None,
            geoip_api_url: default_geoip_api_url(),
        }
    }
}

impl Default for PostbackConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_postback_timeout_ms(),
            jitter_ratio: default_jitter_ratio(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_batch_size: default_poll_batch_size(),
            response_body_limit: default_response_body_limit(),
            user_agent: default_postback_user_agent(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            admin_token: String::new(),
            postback_prefix: default_postback_prefix(),
        }
    }
}
