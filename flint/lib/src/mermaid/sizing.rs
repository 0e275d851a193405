//! Display sizing for diagram bitmaps.

/// Maximum display height, in cells, for a diagram in a terminal with
/// `rows` rows.
///
/// The height is `fraction` of the terminal height, never less than
/// `floor`. Width is left to auto-fit the available space.
///
/// ## Examples
///
/// ```rust
/// use flint_lib::mermaid::sizing::max_display_height;
///
/// assert_eq!(max_display_height(40, 0.6, 30), 30);
/// assert_eq!(max_display_height(100, 0.6, 30), 60);
/// ```
pub fn max_display_height(rows: u16, fraction: f32, floor: u16) -> u16 {
    let scaled = (f32::from(rows) * fraction).floor();
    let scaled = if scaled.is_finite() && scaled > 0.0 {
        scaled.min(f32::from(u16::MAX)) as u16
    } else {
        0
    };
    scaled.max(floor)
}
