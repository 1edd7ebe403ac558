/// Extensions the scanner treats as photos. Everything else found under a
/// library root is ignored.
pub const DEFAULT_PHOTO_FILE_EXTENSIONS: &[&str] = &[
    // Common raster formats
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "heic", "heif",
    "psd",
    // Canon
    "crw", "cr2", "cr3",
    // Nikon
    "nef", "nrw",
    // Sony
    "arw", "srf", "sr2",
    // Fujifilm, Olympus, Panasonic, Leica, Pentax
    "raf", "orf", "rw2", "dng", "pef",
    // Hasselblad, Sigma, Phase One, Samsung, Mamiya, Minolta
    "3fr", "x3f", "iiq", "srw", "mef", "mrw",
    // Kodak
    "dcr", "k25", "kdc",
];

/// Returns true when the path's extension is on the photo allow-list.
/// Matching is case-insensitive; paths without an extension never match.
pub fn is_photo_file(path: &str) -> bool {
    let Some(name) = path.rsplit(['/', '\\']).next() else {
        return false;
    };
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => DEFAULT_PHOTO_FILE_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}
