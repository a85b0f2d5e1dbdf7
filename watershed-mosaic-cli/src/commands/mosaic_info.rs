//! Mosaic-info command - print a mosaic's metadata and stitching progress.

use watershed_mosaic::config::ConfigFile;
use watershed_mosaic::pipeline::mosaic_path;
use watershed_mosaic::raster::MosaicStore;

use crate::error::CliError;

/// Run the mosaic-info command.
pub fn run(config: &ConfigFile, name: &str) -> Result<(), CliError> {
    let path = mosaic_path(&config.mosaic_directory(), name);
    let mosaic_err = |error| CliError::Mosaic {
        name: name.to_string(),
        error,
    };

    let store = MosaicStore::open(&path).map_err(mosaic_err)?;
    let info = store.info();
    let spec = store.spec();
    let (tile_cols, tile_rows) = store.tile_grid();
    let total_tiles = tile_rows * tile_cols;
    let written = store.written_tiles().map_err(mosaic_err)?;

    println!("Mosaic:      {}", name);
    println!("Path:        {}", path.display());
    println!("CRS:         {}", info.crs);
    println!("Bounds:      {}", info.bbox);
    println!("Size:        {} x {} pixels", info.width, info.height);
    println!("Pixel size:  {}", spec.pixel_size);
    println!("Nodata:      {}", info.nodata);
    println!("Tiles:       {} x {} of {} px", tile_cols, tile_rows, spec.tile_size);
    println!(
        "Written:     {} of {} tiles ({:.2}%)",
        written,
        total_tiles,
        percent(written, total_tiles)
    );
    Ok(())
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}
