//! Selection of array sizes which are efficient for the FFT library used by the
//! phasing tool. A size is FFT compatible when its largest prime factor does not
//! exceed a bound and it is divisible by a set of required dividers.
use super::error::ShapeError;

/// Prime decomposition of `number`, in increasing order. Empty for 0 and 1.
pub fn prime_factors(number: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut remainder = number;
    let mut divider = 2;
    while remainder > 1 && divider * divider <= remainder {
        while remainder % divider == 0 {
            factors.push(divider);
            remainder /= divider;
        }
        divider += 1;
    }
    if remainder > 1 {
        factors.push(remainder);
    }
    factors
}

/// Check if a size meets the FFT requirements
pub fn is_fft_compatible(number: usize, maxprime: usize, required_dividers: &[usize]) -> bool {
    if number == 0 {
        return false;
    }
    if required_dividers
        .iter()
        .any(|&divider| divider == 0 || number % divider != 0)
    {
        return false;
    }
    match prime_factors(number).last() {
        Some(largest) => *largest <= maxprime,
        None => true,
    }
}

fn check_constraints(maxprime: usize, required_dividers: &[usize]) -> Result<(), ShapeError> {
    if maxprime < 2 {
        return Err(ShapeError::BadMaxPrime(maxprime));
    }
    for divider in required_dividers {
        if *divider == 0 || prime_factors(*divider).iter().any(|p| *p > maxprime) {
            return Err(ShapeError::IncompatibleDivider(*divider, maxprime));
        }
    }
    Ok(())
}

/// Largest FFT compatible size smaller or equal to `number`
pub fn smaller_prime(
    number: usize,
    maxprime: usize,
    required_dividers: &[usize],
) -> Result<usize, ShapeError> {
    check_constraints(maxprime, required_dividers)?;
    (1..=number)
        .rev()
        .find(|candidate| is_fft_compatible(*candidate, maxprime, required_dividers))
        .ok_or_else(|| ShapeError::NoSmallerSize(number, maxprime, required_dividers.to_vec()))
}

/// Smallest FFT compatible size larger or equal to `number`
///
/// Always terminates: the product of the dividers is itself compatible once the
/// constraints are checked, so some multiple of it is reached.
pub fn higher_prime(
    number: usize,
    maxprime: usize,
    required_dividers: &[usize],
) -> Result<usize, ShapeError> {
    check_constraints(maxprime, required_dividers)?;
    let mut candidate = number.max(1);
    while !is_fft_compatible(candidate, maxprime, required_dividers) {
        candidate += 1;
    }
    Ok(candidate)
}

/// Apply [smaller_prime] independently along each axis of a shape
pub fn smaller_primes<const N: usize>(
    shape: [usize; N],
    maxprime: usize,
    required_dividers: &[usize],
) -> Result<[usize; N], ShapeError> {
    let mut output = shape;
    for (out, dim) in output.iter_mut().zip(shape.iter()) {
        *out = smaller_prime(*dim, maxprime, required_dividers)?;
    }
    Ok(output)
}

/// Apply [higher_prime] independently along each axis of a shape
pub fn higher_primes<const N: usize>(
    shape: [usize; N],
    maxprime: usize,
    required_dividers: &[usize],
) -> Result<[usize; N], ShapeError> {
    let mut output = shape;
    for (out, dim) in output.iter_mut().zip(shape.iter()) {
        *out = higher_prime(*dim, maxprime, required_dividers)?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prime_factors() {
        assert_eq!(prime_factors(360), vec![2, 2, 2, 3, 3, 5]);
        assert_eq!(prime_factors(97), vec![97]);
        assert!(prime_factors(1).is_empty());
        assert!(prime_factors(0).is_empty());
    }

    #[test]
    fn test_compatibility() {
        assert!(is_fft_compatible(100, 7, &[2]));
        assert!(!is_fft_compatible(75, 7, &[2]));
        assert!(!is_fft_compatible(22, 7, &[2]));
        assert!(!is_fft_compatible(0, 7, &[]));
    }

    #[test]
    fn test_smaller_primes() {
        assert_eq!(smaller_prime(100, 7, &[2]).unwrap(), 100);
        assert_eq!(smaller_prime(127, 7, &[2]).unwrap(), 126);
        assert_eq!(smaller_prime(101, 7, &[2]).unwrap(), 100);
        assert_eq!(
            smaller_primes([101, 127, 256], 7, &[2]).unwrap(),
            [100, 126, 256]
        );
        assert!(matches!(
            smaller_prime(1, 7, &[2]),
            Err(ShapeError::NoSmallerSize(1, 7, _))
        ));
    }

    #[test]
    fn test_higher_primes() {
        assert_eq!(higher_prime(101, 7, &[2]).unwrap(), 108);
        assert_eq!(higher_prime(0, 7, &[2]).unwrap(), 2);
        assert_eq!(higher_primes([61, 64], 5, &[4]).unwrap(), [64, 64]);
    }

    #[test]
    fn test_bad_constraints() {
        assert!(matches!(
            higher_prime(10, 7, &[11]),
            Err(ShapeError::IncompatibleDivider(11, 7))
        ));
        assert!(matches!(
            smaller_prime(10, 1, &[]),
            Err(ShapeError::BadMaxPrime(1))
        ));
    }
}
