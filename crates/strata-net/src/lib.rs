//! Wire formats shared by the generation server and the streaming client:
//! the binary tile codec and the request/response protocol.

pub mod codec;
pub mod protocol;

pub use codec::{CodecError, HEADER_LEN, decode, encode};
pub use protocol::{
    GENERATE_PATH, GenerationMeta, GenerationRequest, GenerationResponse, MetaError,
    RequestError, header,
};
