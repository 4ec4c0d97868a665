//! 返现账本对外 API 服务
//!
//! 面向两类调用方：
//!
//! - **公开 API**（`/public/*`）：结算页查询可抵扣额度、客服机器人查询
//!   订单状态，使用 API Key 认证，key 绑定允许访问的路径前缀
//! - **管理端 API**（`/admin/*`）：API Key 管理、手工发放、批量发放任务，
//!   使用静态运维令牌认证
//!
//! ## 模块结构
//!
//! - `dto`: 请求和响应的数据传输对象
//! - `error`: 错误类型与 HTTP 状态码映射
//! - `handlers`: HTTP 请求处理器
//! - `middleware`: API Key / 管理令牌认证中间件
//! - `routes`: 路由配置
//! - `state`: 应用状态

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use dto::ApiResponse;
pub use error::{ApiError, Result};
pub use state::AppState;
