/*
[INPUT]:  Engine-side identities and raw exchange values
[OUTPUT]: Stateless translations between engine and exchange representations
[POS]:    Mapping layer - symbols, order types, numeric scale
[UPDATE]: When translation rules change
*/

pub mod numeric;
pub mod order_type;
pub mod symbol;

pub use numeric::ScaleFactor;
pub use order_type::OrderTypeMapper;
pub use symbol::SymbolMapper;
