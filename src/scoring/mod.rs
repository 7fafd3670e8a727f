pub mod quantize;
pub mod scorer;
