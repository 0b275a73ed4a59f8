pub mod jwt_extractor;
pub mod trace_id;

pub use jwt_extractor::{jwt_auth_middleware, AuthUser};
pub use trace_id::{trace_id_middleware, TraceId, TRACE_ID_HEADER};
