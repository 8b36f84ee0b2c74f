pub mod net;

use pyo3::{prelude::*, wrap_pymodule};

#[pymodule]
fn sequential(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<net::Network>()?;
    Ok(())
}

pub fn construct_module(m: &PyModule) -> PyResult<()> {
    m.add_wrapped(wrap_pymodule!(sequential))?;
    Ok(())
}
