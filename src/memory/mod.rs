//! Memory 모듈 - 세션 단위 대화 기록
//!
//! 세션 상태는 두 가지뿐입니다: 없음 → (`make_memory` 또는 첫 `append`) → 활성.
//! 삭제 연산은 없습니다.

mod session_id;
mod store;

pub use session_id::{new_session_id, slugify};
pub use store::{render_transcript, ConversationTurn, SessionInfo, SessionMemory, SessionStore};
