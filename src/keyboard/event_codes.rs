// Event types and key codes used for capability probing (see [input-event-codes.h] and the
// [kernel docs]).
//
// [input-event-codes.h]: https://elixir.bootlin.com/linux/v5.19.17/source/include/uapi/linux/input-event-codes.h#L38)
// [kernel docs]: https://www.kernel.org/doc/html/latest/input/event-codes.html
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_MSC: u16 = 0x04;
pub const EV_MAX: u16 = 0x1f;

pub const KEY_ESC: u16 = 1;
pub const KEY_ENTER: u16 = 28;
pub const KEY_A: u16 = 30;

/// Highest key code since Linux 2.6.28.
pub const KEY_MAX: u16 = 0x2ff;
/// Highest key code on older kernels.
pub const KEY_MAX_LEGACY: u16 = 0x1ff;
