//! About the output files.
use crate::common::error::*;
use std::fs;
use std::path::Path;





/// Create the output directory (and its parents) if it doesn't exist yet
///
/// # Parameters
/// ```text
/// dir: the directory where the output files are going to be written
/// ```
pub fn create_output_dir(dir: &str) -> Result<(), NnError>
{
    // If the directory already exist, do nothing; otherwise, create the directory
    if Path::new(dir).is_dir()
    {
        return Ok(())
    }
    fs::create_dir_all(dir).map_err(|source| error_dir(dir, source))
}

/// The file holding the sub-network of an element
pub fn element_nn_file(dir: &str, element: &str) -> String
{
    format!("{}/Element_{}_NN.savefile", dir.trim_end_matches('/'), element)
}
