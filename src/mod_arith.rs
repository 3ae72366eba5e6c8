use std::collections::BTreeMap;

pub fn mod_pow(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut result = 1;
    base %= modulus;
    while exp > 0 {
        if exp % 2 == 1 {
            result = mod_mul(result, base, modulus);
        }
        exp >>= 1;
        base = mod_mul(base, base, modulus);
    }
    result
}

pub fn mod_mul(a: u64, b: u64, m: u64) -> u64 {
    (u128::from(a) * u128::from(b) % u128::from(m)) as u64
}

pub fn mod_add(a: u64, b: u64, m: u64) -> u64 {
    ((u128::from(a) + u128::from(b)) % u128::from(m)) as u64
}

pub fn mod_sub(a: u64, b: u64, m: u64) -> u64 {
    mod_add(a % m, m - b % m, m)
}

/// Prime factorization, prime -> exponent. Moduli are carried around in this
/// form so that `totient` never has to factor anything larger than its primes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Factorization(BTreeMap<u64, u32>);

impl Factorization {
    /// Trial division. `of(0)` and `of(1)` are both empty.
    pub fn of(mut n: u64) -> Self {
        let mut factors = BTreeMap::new();
        let mut p = 2;
        while n > 1 && p <= n / p {
            while n % p == 0 {
                *factors.entry(p).or_insert(0) += 1;
                n /= p;
            }
            p += if p == 2 { 1 } else { 2 };
        }
        if n > 1 {
            *factors.entry(n).or_insert(0) += 1;
        }
        Factorization(factors)
    }

    /// `None` once the product leaves `u64`.
    pub fn value(&self) -> Option<u64> {
        self.0.iter().try_fold(1u64, |acc, (&p, &k)| {
            p.checked_pow(k).and_then(|pk| acc.checked_mul(pk))
        })
    }

    pub fn mul(&self, other: &Factorization) -> Factorization {
        let mut factors = self.0.clone();
        for (&p, &k) in &other.0 {
            *factors.entry(p).or_insert(0) += k;
        }
        Factorization(factors)
    }

    /// Euler's phi: p^k becomes p^(k-1) * (p - 1).
    pub fn totient(&self) -> Factorization {
        self.0
            .iter()
            .fold(Factorization::default(), |acc, (&p, &k)| {
                let mut acc = acc.mul(&Factorization::of(p - 1));
                if k > 1 {
                    *acc.0.entry(p).or_insert(0) += k - 1;
                }
                acc
            })
    }
}
