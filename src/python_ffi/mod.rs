//! Python FFI
use pyo3::prelude::*;

mod gen_macros;
pub mod sequential;

#[pymodule]
fn seqnet(_py: Python, m: &PyModule) -> PyResult<()> {
    sequential::construct_module(m)?;
    Ok(())
}
