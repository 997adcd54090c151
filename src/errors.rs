use std::fmt;

#[derive(Debug, Clone)]
pub enum ClickTrailError {
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    FileOperation(String),
    Validation(String),
    NotFound(String),
    Serialization(String),
    DateParse(String),
    Template(String),
    StorageUnavailable(String),
}

impl ClickTrailError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ClickTrailError::DatabaseConfig(_) => "E001",
            ClickTrailError::DatabaseConnection(_) => "E002",
            ClickTrailError::DatabaseOperation(_) => "E003",
            ClickTrailError::FileOperation(_) => "E004",
            ClickTrailError::Validation(_) => "E005",
            ClickTrailError::NotFound(_) => "E006",
            ClickTrailError::Serialization(_) => "E007",
            ClickTrailError::DateParse(_) => "E008",
            ClickTrailError::Template(_) => "E009",
            ClickTrailError::StorageUnavailable(_) => "E010",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            ClickTrailError::DatabaseConfig(_) => "Database Configuration Error",
            ClickTrailError::DatabaseConnection(_) => "Database Connection Error",
            ClickTrailError::DatabaseOperation(_) => "Database Operation Error",
            ClickTrailError::FileOperation(_) => "File Operation Error",
            ClickTrailError::Validation(_) => "Validation Error",
            ClickTrailError::NotFound(_) => "Resource Not Found",
            ClickTrailError::Serialization(_) => "Serialization Error",
            ClickTrailError::DateParse(_) => "Date Parse Error",
            ClickTrailError::Template(_) => "Template Error",
            ClickTrailError::StorageUnavailable(_) => "Storage Unavailable",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            ClickTrailError::DatabaseConfig(msg) => msg,
            ClickTrailError::DatabaseConnection(msg) => msg,
            ClickTrailError::DatabaseOperation(msg) => msg,
            ClickTrailError::FileOperation(msg) => msg,
            ClickTrailError::Validation(msg) => msg,
            ClickTrailError::NotFound(msg) => msg,
            ClickTrailError::Serialization(msg) => msg,
            ClickTrailError::DateParse(msg) => msg,
            ClickTrailError::Template(msg) => msg,
            ClickTrailError::StorageUnavailable(msg) => msg,
        }
    }

    /// 映射到 HTTP 状态码（摄入接口同步返回给调用方）
    pub fn http_status(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ClickTrailError::Validation(_) | ClickTrailError::DateParse(_) => {
                StatusCode::BAD_REQUEST
            }
            ClickTrailError::NotFound(_) => StatusCode::NOT_FOUND,
            // 瞬时故障，调用方可原样重发
            ClickTrailError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 格式化为彩色输出（用于 Server 模式）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于 CLI 模式）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for ClickTrailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for ClickTrailError {}

// 便捷的构造函数
impl ClickTrailError {
    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        ClickTrailError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        ClickTrailError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        ClickTrailError::DatabaseOperation(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        ClickTrailError::FileOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ClickTrailError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        ClickTrailError::NotFound(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        ClickTrailError::Serialization(msg.into())
    }

    pub fn date_parse<T: Into<String>>(msg: T) -> Self {
        ClickTrailError::DateParse(msg.into())
    }

    pub fn template<T: Into<String>>(msg: T) -> Self {
        ClickTrailError::Template(msg.into())
    }

    pub fn storage_unavailable<T: Into<String>>(msg: T) -> Self {
        ClickTrailError::StorageUnavailable(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for ClickTrailError {
    fn from(err: sea_orm::DbErr) -> Self {
        ClickTrailError::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for ClickTrailError {
    fn from(err: std::io::Error) -> Self {
        ClickTrailError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for ClickTrailError {
    fn from(err: serde_json::Error) -> Self {
        ClickTrailError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for ClickTrailError {
    fn from(err: chrono::ParseError) -> Self {
        ClickTrailError::DateParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClickTrailError>;
