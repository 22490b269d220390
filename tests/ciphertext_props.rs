use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use levelled_bgv::ctxt::{incremental_product, inner_product, inner_product_const, Ciphertext, SecretKeyHandle};
use levelled_bgv::error::HeError;
use levelled_bgv::keys::SecretKey;
use levelled_bgv::noise::XDouble;
use levelled_bgv::params::presets::{compact_bgv, compact_bgv_lifted, halfsize_bgv};
use levelled_bgv::random::RandomStream;
use levelled_bgv::ring::{IndexSet, IntPoly};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Secret key over `compact_bgv(p)` with a relinearization matrix for key 0.
fn keys(p: u64, seed: u64) -> (SecretKey, ChaCha20Rng) {
    let ctx = compact_bgv(p).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut sk = SecretKey::generate_with_rng(ctx, 8, &mut rng).unwrap();
    sk.gen_relin_matrix(0, &mut rng).unwrap();
    (sk, rng)
}

fn constant(sk: &SecretKey, v: i64) -> IntPoly {
    IntPoly::constant(sk.context().ring_degree(), v)
}

fn decrypts_to(sk: &SecretKey, ct: &Ciphertext<'_>, v: i64) -> bool {
    let t = BigInt::from(ct.ptxt_space().clone());
    let expected = IntPoly::constant(sk.context().ring_degree(), BigInt::from(v).mod_floor(&t));
    sk.decrypt(ct).unwrap() == expected
}

fn smaller(a: XDouble, b: XDouble) -> XDouble {
    if a < b {
        a
    } else {
        b
    }
}

#[test]
fn test_product_of_scalars() {
    init_tracing();
    let (sk, mut rng) = keys(7, 1);
    let pk = sk.public_key();
    let a = pk.encrypt(&constant(&sk, 3), None, &mut rng).unwrap();
    let b = pk.encrypt(&constant(&sk, 5), None, &mut rng).unwrap();
    let mut stream = RandomStream::from_seed(1);

    let mut c = a.clone();
    c.multiply_by(&b, &mut stream).unwrap();
    assert!(decrypts_to(&sk, &c, 1));
    assert!(c.in_canonical_form(0));
    assert!(c.verify_prime_set());
    assert!(c.level() < a.level());
    assert!(c.noise_var() > smaller(a.noise_var(), b.noise_var()));
    c.log_status("product");
}

#[test]
fn test_add_constant() {
    let (sk, mut rng) = keys(11, 2);
    let pk = sk.public_key();
    let mut c = pk.encrypt(&constant(&sk, 2), None, &mut rng).unwrap();
    let before = c.noise_var();
    c.add_constant(&BigInt::from(4)).unwrap();
    assert!(decrypts_to(&sk, &c, 6));
    assert!(c.noise_var() > before);

    c.add_constant(&BigInt::from(-7)).unwrap();
    assert!(decrypts_to(&sk, &c, 10));

    let poly = IntPoly::from_i64s(&[0, 3], sk.context().ring_degree());
    c.add_constant_poly(&poly, None).unwrap();
    let expected = IntPoly::from_i64s(&[10, 3], sk.context().ring_degree());
    assert_eq!(sk.decrypt(&c).unwrap(), expected);
}

#[test]
fn test_add_constant_after_mod_down() {
    let (sk, mut rng) = keys(11, 3);
    let pk = sk.public_key();
    let mut c = pk.encrypt(&constant(&sk, 2), None, &mut rng).unwrap();
    c.mod_down_to_set(&IndexSet::interval(0, 3)).unwrap();
    c.add_constant(&BigInt::from(5)).unwrap();
    assert_eq!(c.prime_set(), &IndexSet::interval(0, 3));
    assert!(decrypts_to(&sk, &c, 7));
}

#[test]
fn test_squaring_then_clean_up() {
    let (sk, mut rng) = keys(17, 4);
    let pk = sk.public_key();
    let mut x = pk.encrypt(&constant(&sk, 3), None, &mut rng).unwrap();
    let fresh_primes = x.prime_set().len();
    let alias = x.clone();
    assert_eq!(alias.value_id(), x.value_id());

    x.mul_ctxt(&alias).unwrap();
    assert_eq!(x.parts().len(), 3);
    assert!(x.parts().iter().any(|p| *p.handle() == SecretKeyHandle::new(2, 1, 0)));
    assert!(!x.in_canonical_form(0));
    assert!(decrypts_to(&sk, &x, 9));

    let lvl = x.find_base_level();
    assert!(lvl >= 1 && lvl <= x.level());
    x.mod_down_to_level(lvl).unwrap();
    assert_eq!(x.level(), lvl);
    assert!(decrypts_to(&sk, &x, 9));

    let mut stream = RandomStream::from_seed(4);
    x.clean_up(&mut stream).unwrap();
    assert!(x.in_canonical_form(0));
    assert!(x.prime_set().is_disjoint(sk.context().special_primes()));
    assert!(x.prime_set().len() < fresh_primes);
    assert!(decrypts_to(&sk, &x, 9));
}

#[test]
fn test_text_round_trip() {
    let (sk, mut rng) = keys(7, 5);
    let pk = sk.public_key();
    let a = pk.encrypt(&IntPoly::from_i64s(&[1, 2, 3], 32), None, &mut rng).unwrap();
    let mut b = pk.encrypt(&constant(&sk, 2), None, &mut rng).unwrap();
    b.mul_ctxt(&a).unwrap();

    let text = b.to_string();
    let back = Ciphertext::read_from(pk, &text).unwrap();
    assert!(back.equals_to(&b, true));
    assert_ne!(back.value_id(), b.value_id());
    assert_eq!(sk.decrypt(&back).unwrap(), sk.decrypt(&b).unwrap());

    let truncated = &text[..text.len() / 2];
    assert!(matches!(Ciphertext::read_from(pk, truncated), Err(HeError::Parse(_))));
}

#[test]
fn test_read_rejects_part_over_wrong_set() {
    let (sk, mut rng) = keys(7, 6);
    let pk = sk.public_key();
    let a = pk.encrypt(&constant(&sk, 1), None, &mut rng).unwrap();
    let mut low = a.clone();
    low.mod_down_to_set(&IndexSet::interval(0, 4)).unwrap();

    // header of the full-set ciphertext, parts of the lower one
    let full = a.to_string();
    let header_end = full.find('\n').unwrap();
    let lower = low.to_string();
    let body_start = lower.find('\n').unwrap();
    let spliced = format!("{}{}", &full[..header_end], &lower[body_start..]);
    assert!(matches!(
        Ciphertext::read_from(pk, &spliced),
        Err(HeError::InvariantViolation(_))
    ));
}

#[test]
fn test_read_rejects_huge_part_count() {
    let (sk, _) = keys(7, 24);
    let pk = sk.public_key();
    for count in ["18446744073709551615", "1000000000"] {
        let text = format!("[7 0 {{0 1 2 3 4 5}} {count} ]");
        assert!(matches!(Ciphertext::read_from(pk, &text), Err(HeError::Parse(_))));
    }
}

#[test]
fn test_find_base_set_is_idempotent() {
    let (sk, mut rng) = keys(7, 7);
    let pk = sk.public_key();
    let a = pk.encrypt(&constant(&sk, 2), None, &mut rng).unwrap();
    let b = pk.encrypt(&constant(&sk, 3), None, &mut rng).unwrap();
    for mut c in [a.clone(), {
        let mut p = a.clone();
        p.mul_ctxt(&b).unwrap();
        p
    }] {
        let base = c.find_base_set();
        c.mod_down_to_set(&base).unwrap();
        assert_eq!(&c.find_base_set(), c.prime_set());
    }
}

#[test]
fn test_automorphism_round_trip() {
    let (mut sk, mut rng) = keys(7, 8);
    sk.gen_automorph_matrix(5, 0, &mut rng).unwrap();
    sk.gen_automorph_matrix(13, 0, &mut rng).unwrap();
    let pk = sk.public_key();
    let t = pk.ptxt_space().clone();
    let msg = IntPoly::from_i64s(&[1, 2, 3, 4], 32);
    let mut c = pk.encrypt(&msg, None, &mut rng).unwrap();
    let mut stream = RandomStream::from_seed(8);

    c.smart_automorph(5, &mut stream).unwrap();
    assert!(c.in_canonical_form(0));
    assert_eq!(sk.decrypt(&c).unwrap(), msg.automorph(5).reduce_mod(&t));

    c.smart_automorph(13, &mut stream).unwrap();
    assert_eq!(sk.decrypt(&c).unwrap(), msg.reduce_mod(&t));

    // 25 = 5·5 is reached by chaining the 5-matrix
    c.smart_automorph(25, &mut stream).unwrap();
    assert_eq!(sk.decrypt(&c).unwrap(), msg.automorph(25).reduce_mod(&t));

    let before = c.clone();
    assert!(matches!(
        c.smart_automorph(63, &mut stream),
        Err(HeError::UnreachableAutomorphism { k: 63, key_id: 0 })
    ));
    assert!(c.equals_to(&before, true));
    assert!(c.smart_automorph(4, &mut stream).is_err());
}

#[test]
fn test_frobenius() {
    let (mut sk, mut rng) = keys(7, 9);
    sk.gen_frobenius_matrices(0, &mut rng).unwrap();
    let pk = sk.public_key();
    let t = pk.ptxt_space().clone();
    let msg = IntPoly::from_i64s(&[0, 1, 5], 32);
    let mut c = pk.encrypt(&msg, None, &mut rng).unwrap();
    let mut stream = RandomStream::from_seed(9);

    c.frobenius_automorph(1, &mut stream).unwrap();
    assert_eq!(sk.decrypt(&c).unwrap(), msg.automorph(7).reduce_mod(&t));
    // ord(7) mod 64 is 8, so -1 is the seventh power
    c.frobenius_automorph(-1, &mut stream).unwrap();
    assert_eq!(sk.decrypt(&c).unwrap(), msg.reduce_mod(&t));
}

#[test]
fn test_divide_by_2() {
    let ctx = compact_bgv_lifted(2, 3).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(10);
    let sk = SecretKey::generate_with_rng(ctx, 8, &mut rng).unwrap();
    let pk = sk.public_key();
    let mut c = pk.encrypt(&constant(&sk, 4), None, &mut rng).unwrap();
    let noise = c.noise_var();

    c.divide_by_2().unwrap();
    assert_eq!(c.ptxt_space(), &BigUint::from(4u32));
    assert!(decrypts_to(&sk, &c, 2));
    assert!((c.noise_var().ln() - (noise.ln() - 4f64.ln())).abs() < 1e-9);

    c.divide_by_2().unwrap();
    assert_eq!(c.ptxt_space(), &BigUint::from(2u32));
    assert!(decrypts_to(&sk, &c, 1));
    assert!(matches!(c.divide_by_2(), Err(HeError::InvalidParam(_))));
}

#[test]
fn test_divide_by_p() {
    let ctx = compact_bgv_lifted(3, 2).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(11);
    let sk = SecretKey::generate_with_rng(ctx, 8, &mut rng).unwrap();
    let pk = sk.public_key();
    let mut c = pk.encrypt(&constant(&sk, 6), None, &mut rng).unwrap();
    let noise = c.noise_var();
    c.divide_by_p().unwrap();
    assert_eq!(c.ptxt_space(), &BigUint::from(3u32));
    assert!(decrypts_to(&sk, &c, 2));
    assert!((c.noise_var().ln() - (noise.ln() - 2.0 * 3f64.ln())).abs() < 1e-9);
    assert!(c.divide_by_p().is_err());
}

#[test]
fn test_incremental_product() {
    let (sk, mut rng) = keys(17, 12);
    let pk = sk.public_key();
    let mut v: Vec<Ciphertext<'_>> = [2, 3, 4, 5]
        .iter()
        .map(|&m| pk.encrypt(&constant(&sk, m), None, &mut rng).unwrap())
        .collect();
    let mut stream = RandomStream::from_seed(12);
    incremental_product(&mut v, &mut stream).unwrap();
    for (c, expected) in v.iter().zip([2, 6, 7, 1]) {
        assert!(decrypts_to(&sk, c, expected));
    }
}

#[test]
fn test_inner_products() {
    let (sk, mut rng) = keys(17, 13);
    let pk = sk.public_key();
    let enc = |m: i64, rng: &mut ChaCha20Rng| pk.encrypt(&constant(&sk, m), None, rng).unwrap();
    let v1 = vec![enc(2, &mut rng), enc(3, &mut rng)];
    let v2 = vec![enc(4, &mut rng), enc(5, &mut rng)];
    let mut stream = RandomStream::from_seed(13);

    let mut result = Ciphertext::new(pk, None).unwrap();
    inner_product(&mut result, &v1, &v2, &mut stream).unwrap();
    assert!(result.in_canonical_form(0));
    assert!(decrypts_to(&sk, &result, 6));

    let consts = vec![constant(&sk, 4), constant(&sk, 5)];
    inner_product_const(&mut result, &v1, &consts).unwrap();
    assert!(decrypts_to(&sk, &result, 6));

    inner_product(&mut result, &[], &v2, &mut stream).unwrap();
    assert!(result.is_empty());
}

#[test]
fn test_multiply_by2() {
    let (mut sk, mut rng) = keys(17, 14);
    sk.gen_key_switch_matrix(SecretKeyHandle::new(3, 1, 0), 0, &mut rng).unwrap();
    let pk = sk.public_key();
    let mut stream = RandomStream::from_seed(14);
    let a = pk.encrypt(&constant(&sk, 2), None, &mut rng).unwrap();
    let b = pk.encrypt(&constant(&sk, 3), None, &mut rng).unwrap();

    let mut c = pk.encrypt(&constant(&sk, 4), None, &mut rng).unwrap();
    c.multiply_by2(&a, &b, &mut stream).unwrap();
    assert!(c.in_canonical_form(0));
    assert!(decrypts_to(&sk, &c, 7));

    // cube: the receiver aliases both operands
    let mut x = pk.encrypt(&constant(&sk, 3), None, &mut rng).unwrap();
    let (x1, x2) = (x.clone(), x.clone());
    x.multiply_by2(&x1, &x2, &mut stream).unwrap();
    assert!(decrypts_to(&sk, &x, 10));
}

#[test]
fn test_tensor_product_handles() {
    let (sk, mut rng) = keys(7, 15);
    let pk = sk.public_key();
    let a = pk.encrypt(&constant(&sk, 2), None, &mut rng).unwrap();
    let b = pk.encrypt(&constant(&sk, 4), None, &mut rng).unwrap();
    let c = Ciphertext::tensor_product(&a, &b).unwrap();
    let handles: Vec<_> = c.parts().iter().map(|p| *p.handle()).collect();
    assert_eq!(
        handles,
        vec![SecretKeyHandle::one(), SecretKeyHandle::base(0), SecretKeyHandle::new(2, 1, 0)]
    );
    assert!(decrypts_to(&sk, &c, 1));

    let mut low = b.clone();
    low.mod_down_to_set(&IndexSet::interval(0, 3)).unwrap();
    assert!(matches!(
        Ciphertext::tensor_product(&a, &low),
        Err(HeError::IndexSetMismatch { .. })
    ));
}

#[test]
fn test_constants_and_negation() {
    let (sk, mut rng) = keys(11, 16);
    let pk = sk.public_key();
    let n = sk.context().ring_degree();
    let mut c = pk.encrypt(&constant(&sk, 3), None, &mut rng).unwrap();
    let id = c.value_id();

    c.mult_by_constant(&BigInt::from(-2)).unwrap();
    assert!(decrypts_to(&sk, &c, 5));
    assert_ne!(c.value_id(), id);

    c.negate();
    assert!(decrypts_to(&sk, &c, 6));

    let x = IntPoly::from_i64s(&[0, 1], n);
    c.mult_by_constant_poly(&x, None).unwrap();
    assert_eq!(sk.decrypt(&c).unwrap(), IntPoly::from_i64s(&[0, 6], n));
}

#[test]
fn test_halfsize_levels() {
    let ctx = halfsize_bgv(17).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(17);
    let mut sk = SecretKey::generate_with_rng(ctx, 8, &mut rng).unwrap();
    sk.gen_relin_matrix(0, &mut rng).unwrap();
    let pk = sk.public_key();
    let mut c = pk.encrypt(&constant(&sk, 3), None, &mut rng).unwrap();
    assert_eq!(c.level(), 15);

    c.mod_down_to_level(12).unwrap();
    assert_eq!(c.prime_set(), &IndexSet::interval(1, 6));
    assert!(decrypts_to(&sk, &c, 3));

    c.mod_down_to_level(11).unwrap();
    assert_eq!(c.prime_set(), &IndexSet::interval(0, 5));
    assert_eq!(c.level(), 11);
    assert!(decrypts_to(&sk, &c, 3));

    let d = pk.encrypt(&constant(&sk, 5), None, &mut rng).unwrap();
    let mut stream = RandomStream::from_seed(17);
    c.multiply_by(&d, &mut stream).unwrap();
    assert!(c.verify_prime_set());
    assert!(decrypts_to(&sk, &c, 15));
    assert!(c.mod_down_to_level(0).is_err());
}

#[test]
fn test_failed_operations_leave_ciphertext_unchanged() {
    let ctx = compact_bgv(7).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(18);
    let sk = SecretKey::generate_with_rng(ctx, 8, &mut rng).unwrap();
    let pk = sk.public_key();
    let a = pk.encrypt(&constant(&sk, 2), None, &mut rng).unwrap();
    let mut stream = RandomStream::from_seed(18);

    // no relinearization matrix was published
    let mut c = a.clone();
    assert!(matches!(c.multiply_by(&a.clone(), &mut stream), Err(HeError::MissingKey(_))));
    assert!(c.equals_to(&a, true));

    assert!(matches!(
        c.mod_down_to_set(&IndexSet::interval(20, 21)),
        Err(HeError::EmptyModDown { .. })
    ));
    assert!(c.equals_to(&a, true));

    assert!(c.reduce_ptxt_space(&BigUint::from(5u32)).is_err());
    assert_eq!(c.ptxt_space(), &BigUint::from(7u32));
}

#[test]
fn test_foreign_ciphertexts_rejected() {
    let (sk1, mut rng) = keys(7, 19);
    let (sk2, _) = keys(7, 20);
    let a = sk1.public_key().encrypt(&constant(&sk1, 1), None, &mut rng).unwrap();
    let b = sk2.public_key().encrypt(&constant(&sk2, 1), None, &mut rng).unwrap();
    let mut c = a.clone();
    assert!(matches!(c.add_ctxt(&b, false), Err(HeError::ForeignCiphertext)));
    assert!(matches!(sk2.decrypt(&a), Err(HeError::ForeignCiphertext)));
    assert!(!a.equals_to(&b, false));
}

#[test]
fn test_useless_primes() {
    let (sk, mut rng) = keys(7, 21);
    let pk = sk.public_key();
    let msg = constant(&sk, 4);
    let c = pk.encrypt(&msg, None, &mut rng).unwrap();
    let droppable = c.useless_primes(&sk, &msg).unwrap();
    assert!(droppable >= 1 && droppable <= c.prime_set().len());
}

#[test]
fn test_blind_rerandomizes() {
    let (sk, mut rng) = keys(17, 23);
    let pk = sk.public_key();
    let n = sk.context().ring_degree();
    let mut c = pk.encrypt(&constant(&sk, 6), None, &mut rng).unwrap();
    c.mod_down_to_set(&IndexSet::interval(0, 4)).unwrap();
    let before = c.clone();

    c.blind(&IntPoly::zero(n), &mut rng).unwrap();
    assert_eq!(c.prime_set(), sk.context().ctxt_primes());
    assert!(decrypts_to(&sk, &c, 6));
    assert!(c.noise_var() > before.noise_var());
    assert_ne!(c.value_id(), before.value_id());

    c.blind(&constant(&sk, 3), &mut rng).unwrap();
    assert!(decrypts_to(&sk, &c, 9));
}

#[test]
fn test_dummy_encrypt_and_clear() {
    let (sk, _) = keys(7, 22);
    let pk = sk.public_key();
    let mut c = Ciphertext::new(pk, None).unwrap();
    assert!(c.is_empty());
    c.dummy_encrypt(&constant(&sk, 5), None).unwrap();
    assert_eq!(c.parts().len(), 1);
    assert!(c.in_canonical_form(0));
    assert!(decrypts_to(&sk, &c, 5));
    c.clear();
    assert!(c.is_empty());
    assert!(c.noise_var().is_zero());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_additive_homomorphism(a in 0i64..7, b in 0i64..7, drop in 0usize..3, seed in any::<u64>()) {
        let ctx = compact_bgv(7).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let sk = SecretKey::generate_with_rng(ctx, 8, &mut rng).unwrap();
        let pk = sk.public_key();
        let mut ca = pk.encrypt(&constant(&sk, a), None, &mut rng).unwrap();
        let cb = pk.encrypt(&constant(&sk, b), None, &mut rng).unwrap();
        // put the left operand at a lower level to exercise the mod-up path
        ca.mod_down_to_set(&IndexSet::interval(0, 5 - drop)).unwrap();

        let mut sum = ca.clone();
        sum.add_ctxt(&cb, false).unwrap();
        prop_assert!(decrypts_to(&sk, &sum, a + b));
        prop_assert!(sum.noise_var() >= cb.noise_var());

        let mut diff = ca.clone();
        diff.sub_ctxt(&cb).unwrap();
        prop_assert!(decrypts_to(&sk, &diff, a - b));
    }

    #[test]
    fn prop_mod_switching_preserves_message(m in 0i64..17, lo in 1usize..6, seed in any::<u64>()) {
        let ctx = compact_bgv(17).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let sk = SecretKey::generate_with_rng(ctx, 8, &mut rng).unwrap();
        let pk = sk.public_key();
        let mut c = pk.encrypt(&constant(&sk, m), None, &mut rng).unwrap();

        c.mod_down_to_set(&IndexSet::interval(0, lo - 1)).unwrap();
        prop_assert!(decrypts_to(&sk, &c, m));
        prop_assert_eq!(c.level(), lo);

        let noise = c.noise_var();
        c.mod_up_to_set(&IndexSet::interval(0, 5)).unwrap();
        prop_assert!(decrypts_to(&sk, &c, m));
        prop_assert!(c.noise_var() > noise);

        c.mod_down_to_set(&IndexSet::interval(0, lo - 1)).unwrap();
        prop_assert!(decrypts_to(&sk, &c, m));
    }

    #[test]
    fn prop_multiplication_mod_t(a in 0i64..17, b in 0i64..17, seed in any::<u64>()) {
        let (sk, mut rng) = keys(17, seed);
        let pk = sk.public_key();
        let ca = pk.encrypt(&constant(&sk, a), None, &mut rng).unwrap();
        let cb = pk.encrypt(&constant(&sk, b), None, &mut rng).unwrap();
        let mut stream = RandomStream::from_seed(seed);
        let mut prod = ca.clone();
        prod.multiply_by(&cb, &mut stream).unwrap();
        prop_assert!(decrypts_to(&sk, &prod, a * b));
        prop_assert!(prod.noise_var() > smaller(ca.noise_var(), cb.noise_var()));
    }
}
