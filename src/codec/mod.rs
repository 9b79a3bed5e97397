pub use self::wire_buf::{WireBuf, DEFAULT_MAX_SIZE};

mod bignum;
mod wire_buf;
