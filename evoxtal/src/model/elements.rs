//! Chemical element symbols, indexed by atomic number.

const SYMBOLS: [&str; 119] = [
    "X", "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge",
    "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd",
    "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd",
    "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm",
    "Bk", "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn",
    "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Element symbol for an atomic number; unknown numbers map to "X".
pub fn symbol(atomic_number: u32) -> &'static str {
    SYMBOLS.get(atomic_number as usize).copied().unwrap_or("X")
}

/// Atomic number for an element symbol, if recognized.
pub fn atomic_number(symbol: &str) -> Option<u32> {
    SYMBOLS
        .iter()
        .skip(1)
        .position(|&s| s == symbol)
        .map(|i| (i + 1) as u32)
}

#[cfg(test)]
mod tests {
    use super::{atomic_number, symbol};

    #[test]
    fn test_symbol_lookup() {
        assert_eq!(symbol(1), "H");
        assert_eq!(symbol(14), "Si");
        assert_eq!(symbol(118), "Og");
        assert_eq!(symbol(0), "X");
        assert_eq!(symbol(300), "X");
    }

    #[test]
    fn test_atomic_number_lookup() {
        assert_eq!(atomic_number("H"), Some(1));
        assert_eq!(atomic_number("Mg"), Some(12));
        assert_eq!(atomic_number("Zz"), None);
    }
}
