pub mod backends;
pub mod disassemble;
pub mod hints;
pub mod inspect;
pub mod util;

pub use backends::*;
pub use disassemble::*;
pub use hints::*;
pub use inspect::*;
pub use util::*;
