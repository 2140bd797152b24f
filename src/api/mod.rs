// ==========================================
// Zephyr 导入工具 - API 层
// ==========================================
// 职责: 请求校验与响应组装，供 CLI 或外部宿主调用
// ==========================================

pub mod error;
pub mod import_api;
pub mod request;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{
    HealthResponse, ImportApi, ImportApiResponse, ImportFailureResponse, ImportResponse,
    ResponseErrors,
};
pub use request::{
    validate_import_request, FileInput, ImportRequest, RequestFields, RequestValue,
};
