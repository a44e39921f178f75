pub mod population_dataset; // train/val views of a population data file
pub mod simulate; // synthetic population data
