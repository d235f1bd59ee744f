use rand::Rng;
use rand::rngs::StdRng;

use super::portable::{Portable, Portable16};
use super::*;
use crate::testing::rng;

/// Exercises every `Lanes32` operation of `V` against plain scalar code.
unsafe fn check_lanes32<V: Lanes32>(rng: &mut StdRng) {
    let n = V::LANES;
    let full = lanes_mask(n);
    unsafe {
        // Loads: contiguous, even-stride (also right at the end of a slice)
        // and partial.
        let src: Vec<u32> = (0..4 * n + 3).map(|_| rng.random()).collect();
        let mut out = vec![0u32; n];
        for at in [0, 1, n - 1, src.len() - 2 * n + 1] {
            V::store(V::load_even(&src, at), &mut out);
            let expected: Vec<u32> = (0..n).map(|k| src[at + 2 * k]).collect();
            assert_eq!(out, expected, "load_even at {at}");
        }
        for count in 1..=n {
            V::store(V::load_partial(&src, 3, count), &mut out);
            assert_eq!(&out[..count], &src[3..3 + count], "load_partial {count}");
            assert!(out[count..].iter().all(|&v| v == 0));

            V::store(V::load_even_partial(&src, 1, count), &mut out);
            for k in 0..count {
                assert_eq!(out[k], src[1 + 2 * k]);
            }
            assert!(out[count..].iter().all(|&v| v == 0));
        }

        // Wrapping rectangle sums reinterpreted as i32.
        let big: Vec<u32> = (0..n).map(|k| u32::MAX - k as u32).collect();
        let small: Vec<u32> = (0..n).map(|k| k as u32 * 3).collect();
        let zero = vec![0u32; n];
        let sum = V::rect_sum(V::load(&small, 0), V::load(&big, 0), V::load(&zero, 0), V::load(&zero, 0));
        let mut floats = [0.0f32; MAX_LANES];
        V::store_f(V::to_f(sum), &mut floats);
        for k in 0..n {
            let expected = small[k].wrapping_sub(big[k]) as i32 as f32;
            assert_eq!(floats[k], expected);
        }

        let from_floats = |values: &[f32]| {
            let mut v = V::splat_f(0.0);
            for (k, &x) in values.iter().enumerate() {
                v = V::select_f(V::mask_from_bits(1 << k), V::splat_f(x), v);
            }
            v
        };

        // Norm fallback.
        let variance: Vec<f32> = (0..n).map(|k| [-4.0, 0.0, 6.25, 2.0][k % 4]).collect();
        V::store_f(V::sqrt_or_one(from_floats(&variance)), &mut floats);
        for k in 0..n {
            let expected = if variance[k] > 0.0 { variance[k].sqrt() } else { 1.0 };
            assert_eq!(floats[k], expected, "lane {k}");
        }

        // Compare, select and mask round trips.
        let a: Vec<f32> = (0..n).map(|_| rng.random_range(-2.0..2.0)).collect();
        let fa = from_floats(&a);
        V::store_f(fa, &mut floats);
        assert_eq!(&floats[..n], &a[..]);

        let below = V::movemask(V::lt_f(fa, V::splat_f(0.0)));
        let expected = (0..n).fold(0, |m, k| m | (((a[k] < 0.0) as LiveMask) << k));
        assert_eq!(below, expected);
        assert_eq!(V::movemask(V::mask_from_bits(full)), full);
        assert_eq!(V::movemask(V::mask_from_bits(0)), 0);
        let alternating = 0x5555_5555_5555_5555 & full;
        assert_eq!(V::movemask(V::mask_from_bits(alternating)), alternating);

        // LBP subset lookup against the scalar membership test.
        for _ in 0..16 {
            let subset: [u32; 8] = std::array::from_fn(|_| rng.random());
            let central: Vec<u32> = (0..n).map(|_| rng.random_range(0..64)).collect();
            let cells: Vec<Vec<u32>> = (0..8)
                .map(|_| (0..n).map(|_| rng.random_range(0..64)).collect())
                .collect();
            let c = V::load(&central, 0);
            let ge: [V::M; 8] = std::array::from_fn(|i| V::ge_u(V::load(&cells[i], 0), c));
            let hits = V::movemask(V::lbp_lookup(&ge, &subset));
            for k in 0..n {
                let code = (0..8).fold(0, |code, i| (code << 1) | (cells[i][k] >= central[k]) as usize);
                assert_eq!((hits >> k) & 1 != 0, subset_contains(&subset, code), "lane {k} code {code}");
            }
        }

        check_mask_row::<V>(rng);
    }
}

/// Exercises every `Lanes16` operation of `V` against plain scalar code.
unsafe fn check_lanes16<V: Lanes16>(rng: &mut StdRng) {
    let n = V::LANES;
    unsafe {
        let src: Vec<u16> = (0..2 * n + 5).map(|_| rng.random()).collect();
        let mut out = vec![0u16; n];
        for count in 1..=n {
            V::store(V::load_partial(&src, 5, count), &mut out);
            assert_eq!(&out[..count], &src[5..5 + count]);
            assert!(out[count..].iter().all(|&v| v == 0));
        }

        // Signed wrapping accumulation and comparison.
        let a: Vec<u16> = (0..n).map(|_| rng.random()).collect();
        let b: Vec<u16> = (0..n).map(|_| rng.random()).collect();
        V::store(V::add(V::load(&a, 0), V::load(&b, 0)), &mut out);
        for k in 0..n {
            assert_eq!(out[k], a[k].wrapping_add(b[k]));
        }
        let lt = V::movemask(V::lt_i(V::load(&a, 0), V::load(&b, 0)));
        let ge = V::movemask(V::ge_u(V::load(&a, 0), V::load(&b, 0)));
        for k in 0..n {
            assert_eq!((lt >> k) & 1 != 0, (a[k] as i16) < (b[k] as i16));
            assert_eq!((ge >> k) & 1 != 0, a[k] >= b[k]);
        }
        let zero = vec![0u16; n];
        V::store(V::rect_sum(V::load(&zero, 0), V::load(&a, 0), V::load(&b, 0), V::load(&zero, 0)), &mut out);
        for k in 0..n {
            assert_eq!(out[k], 0u16.wrapping_sub(a[k]).wrapping_sub(b[k]));
        }

        let bits = 0x0f0f_0f0f_0f0f_0f0f & lanes_mask(n);
        V::store(V::select(V::mask_from_bits(bits), V::splat(-7), V::splat(300)), &mut out);
        for k in 0..n {
            let expected = if (bits >> k) & 1 != 0 { -7i16 } else { 300 };
            assert_eq!(out[k] as i16, expected);
        }

        for _ in 0..16 {
            let subset: [u32; 8] = std::array::from_fn(|_| rng.random());
            let central: Vec<u16> = (0..n).map(|_| rng.random_range(0..64)).collect();
            let cells: Vec<Vec<u16>> = (0..8)
                .map(|_| (0..n).map(|_| rng.random_range(0..64)).collect())
                .collect();
            let c = V::load(&central, 0);
            let ge: [V::M; 8] = std::array::from_fn(|i| V::ge_u(V::load(&cells[i], 0), c));
            let hits = V::movemask(V::lbp_lookup(&ge, &subset));
            for k in 0..n {
                let code = (0..8).fold(0, |code, i| (code << 1) | (cells[i][k] >= central[k]) as usize);
                assert_eq!((hits >> k) & 1 != 0, subset_contains(&subset, code), "lane {k} code {code}");
            }
        }

        check_mask_row::<V>(rng);
    }
}

unsafe fn check_mask_row<V: MaskRow>(rng: &mut StdRng) {
    unsafe {
        for len in 0..70 {
            let src: Vec<u8> = (0..len).map(|_| if rng.random_bool(0.5) { rng.random_range(1..=255) } else { 0 }).collect();
            let mut wide = vec![V::Elem::default(); len];
            V::unpack_mask(&src, &mut wide);
            for (w, &s) in wide.iter().zip(&src) {
                assert_eq!(*w != V::Elem::default(), s != 0);
            }

            let mut packed = vec![9u8; len];
            V::pack_result(&wide, &mut packed);
            let expected: Vec<u8> = src.iter().map(|&s| (s != 0) as u8).collect();
            assert_eq!(packed, expected, "len {len}");

            // Even stride: every other mask byte in, interleaved bytes out.
            let half = len.div_ceil(2);
            let mut even = vec![V::Elem::ONE; half];
            V::unpack_mask_even(&src, &mut even);
            for (j, e) in even.iter().enumerate() {
                assert_eq!(*e != V::Elem::default(), src[2 * j] != 0, "even unpack len {len} at {j}");
            }
            let mut spread = vec![9u8; len];
            V::pack_result_even(&even, &mut spread);
            let expected: Vec<u8> = (0..len)
                .map(|x| if x % 2 == 0 { (src[x] != 0) as u8 } else { 0 })
                .collect();
            assert_eq!(spread, expected, "even pack len {len}");

            for at in (0..len).step_by(V::LANES) {
                let lanes = V::LANES.min(len - at);
                let live = V::live_bits(&wide, at, lanes);
                for k in 0..lanes {
                    assert_eq!((live >> k) & 1 != 0, src[at + k] != 0);
                }
                assert_eq!(live & !lanes_mask(lanes), 0);
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[test]
fn test_lanes_mask() {
    assert_eq!(lanes_mask(0), 0);
    assert_eq!(lanes_mask(3), 0b111);
    assert_eq!(lanes_mask(64), u64::MAX);
}

#[test]
fn test_subset_contains() {
    let mut subset = [0u32; 8];
    subset[0] = 1 << 5;
    subset[7] = 1 << 31;
    assert!(subset_contains(&subset, 5));
    assert!(subset_contains(&subset, 255));
    assert!(!subset_contains(&subset, 4));
    assert!(!subset_contains(&subset, 37));
}

// ============================================================================
// Portable
// ============================================================================

#[test]
fn test_portable_32() {
    let mut rng = rng(32);
    unsafe {
        check_lanes32::<Portable<4>>(&mut rng);
        check_lanes32::<Portable<8>>(&mut rng);
        check_lanes32::<Portable<16>>(&mut rng);
    }
}

#[test]
fn test_portable_16() {
    let mut rng = rng(16);
    unsafe {
        check_lanes16::<Portable16<8>>(&mut rng);
        check_lanes16::<Portable16<16>>(&mut rng);
        check_lanes16::<Portable16<32>>(&mut rng);
    }
}

// ============================================================================
// x86_64
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[test]
fn test_sse41() {
    if !common::cpu_features::has_sse4_1() {
        eprintln!("SSE4.1 not available, skipping test");
        return;
    }
    let mut rng = rng(41);
    unsafe {
        check_lanes32::<super::sse41::Sse41F32>(&mut rng);
        check_lanes16::<super::sse41::Sse41I16>(&mut rng);
    }
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_avx2() {
    if !common::cpu_features::has_avx2() {
        eprintln!("AVX2 not available, skipping test");
        return;
    }
    let mut rng = rng(2);
    unsafe {
        check_lanes32::<super::avx2::Avx2F32>(&mut rng);
        check_lanes16::<super::avx2::Avx2I16>(&mut rng);
    }
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_avx512bw() {
    if !common::cpu_features::has_avx512bw() {
        eprintln!("AVX-512BW not available, skipping test");
        return;
    }
    let mut rng = rng(512);
    unsafe {
        check_lanes32::<super::avx512bw::Avx512F32>(&mut rng);
        check_lanes16::<super::avx512bw::Avx512I16>(&mut rng);
    }
}

// ============================================================================
// aarch64
// ============================================================================

#[cfg(target_arch = "aarch64")]
#[test]
fn test_neon() {
    if !common::cpu_features::has_neon() {
        eprintln!("NEON not available, skipping test");
        return;
    }
    let mut rng = rng(64);
    unsafe {
        check_lanes32::<super::neon::NeonF32>(&mut rng);
        check_lanes16::<super::neon::NeonI16>(&mut rng);
    }
}
