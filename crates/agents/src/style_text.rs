//! Style-aware response templates.
//!
//! Every user-visible surface picks its wording from the detected
//! [`Style`], so no raw exception message or generic English string ever
//! reaches the user. Shared by all three agents, the Orchestrator's
//! stop-intent short-circuit, and the ScriptPipeline.

use sa_domain::model::Style;

pub fn stop_farewell(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay, ya pes ñaño, cualquier cosa aquí estoy. ¡Que le vaya bonito!".into(),
        Style::Juvenil => "Okaa, nos vemos! Aquí ando si se te ofrece algo más 😉".into(),
        Style::Formal => "Entendido, ha sido un gusto atenderle. Quedo a sus órdenes para cualquier consulta futura.".into(),
        Style::Neutral => "De acuerdo, gracias por escribir. Aquí estaré si necesitas algo más.".into(),
    }
}

pub fn search_greeting(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay mire lo que encontré para usted:".into(),
        Style::Juvenil => "Mira lo que encontré, está bacán:".into(),
        Style::Formal => "He encontrado las siguientes opciones para usted:".into(),
        Style::Neutral => "Encontré estos productos:".into(),
    }
}

pub fn search_clarification(style: Style) -> String {
    match style {
        Style::Cuencano => "Ñañito, cuénteme un poco más de lo que busca para ayudarle mejor.".into(),
        Style::Juvenil => "Cuéntame un toque más de lo que buscas porfa.".into(),
        Style::Formal => "¿Podría brindarme más detalles sobre el producto que busca?".into(),
        Style::Neutral => "¿Me puedes dar más detalles de lo que buscas?".into(),
    }
}

pub fn search_db_error(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay, se me complicó la búsqueda. ¿Le parece si probamos con otra palabra?".into(),
        Style::Juvenil => "Se me trabó la búsqueda jaja, intenta con otra palabra.".into(),
        Style::Formal => "No fue posible completar la búsqueda en este momento. ¿Podría intentar con otro término?".into(),
        Style::Neutral => "No pude completar la búsqueda. ¿Probamos con otra palabra?".into(),
    }
}

pub fn no_results(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay, no encontré nada con eso. ¿Probamos con otro nombre?".into(),
        Style::Juvenil => "No salió nada con eso xd, prueba con otro nombre.".into(),
        Style::Formal => "No se encontraron resultados para su búsqueda. ¿Desearía intentar con otro término?".into(),
        Style::Neutral => "No encontré resultados. ¿Quieres probar con otra palabra?".into(),
    }
}

pub fn faq_lead_in(style: Style, passage: &str) -> String {
    match style {
        Style::Cuencano => format!("Ñaño, le cuento: {passage}"),
        Style::Juvenil => format!("Te cuento: {passage}"),
        Style::Formal => format!("Con gusto le comento: {passage}"),
        Style::Neutral => format!("Aquí tienes la información: {passage}"),
    }
}

pub fn faq_miss(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay, no tengo esa información a la mano ahorita.".into(),
        Style::Juvenil => "No tengo esa info ahorita, sorry.".into(),
        Style::Formal => "No dispongo de esa información en este momento.".into(),
        Style::Neutral => "No tengo esa información disponible por ahora.".into(),
    }
}

pub fn generic_apology(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay, disculpe, se me hizo un poco largo. ¿Me repite por favor?".into(),
        Style::Juvenil => "Uy se tardó mucho, repíteme porfa 🙏".into(),
        Style::Formal => "Disculpe la demora, ¿podría repetir su consulta?".into(),
        Style::Neutral => "Perdón, tardó demasiado. ¿Puedes repetir tu mensaje?".into(),
    }
}

pub fn transfer_apology(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay, algo falló por aquí. Déjeme ver cómo le ayudo de otra forma.".into(),
        Style::Juvenil => "Uy algo se rompió, dame un toque.".into(),
        Style::Formal => "Se produjo un inconveniente. Permítame atenderle de otra manera.".into(),
        Style::Neutral => "Tuve un problema. Dame un momento para ayudarte de otra forma.".into(),
    }
}

pub fn checkout_confirm_prompt(style: Style, product_name: &str, final_price: f64) -> String {
    match style {
        Style::Cuencano => format!(
            "Ñañito, le queda {product_name} a ${final_price:.2}. ¿Se lo llevamos, sí o no?"
        ),
        Style::Juvenil => format!("{product_name} está en ${final_price:.2}. ¿Te lo llevas? sí/no"),
        Style::Formal => format!(
            "El producto seleccionado es {product_name} con un precio de ${final_price:.2}. ¿Confirma la compra? (sí/no)"
        ),
        Style::Neutral => format!("{product_name} cuesta ${final_price:.2}. ¿Confirmas la compra? (sí/no)"),
    }
}

pub fn checkout_ask_alternative(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay, ya no me quedan más opciones parecidas. ¿Buscamos algo nuevo?".into(),
        Style::Juvenil => "Ya no hay más opciones así, ¿buscamos otra cosa?".into(),
        Style::Formal => "No hay más alternativas disponibles. ¿Desearía iniciar una nueva búsqueda?".into(),
        Style::Neutral => "No quedan más alternativas. ¿Buscamos algo nuevo?".into(),
    }
}

pub fn checkout_address_request(style: Style) -> String {
    match style {
        Style::Cuencano => "Ñaño, dígame su talla (entre 35 y 50) y la dirección para el envío.".into(),
        Style::Juvenil => "Dime tu talla (35 a 50) y tu dirección para el envío porfa.".into(),
        Style::Formal => "Por favor indíqueme su talla (entre 35 y 50) y la dirección de envío.".into(),
        Style::Neutral => "Dime tu talla (entre 35 y 50) y tu dirección de envío.".into(),
    }
}

pub fn checkout_address_parse_error(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay, no le entendí bien la talla. ¿Me repite talla y dirección?".into(),
        Style::Juvenil => "No te entendí la talla, repíteme talla y dirección porfa.".into(),
        Style::Formal => "No fue posible interpretar la talla indicada. ¿Podría repetir talla y dirección?".into(),
        Style::Neutral => "No entendí la talla. ¿Puedes repetir talla y dirección?".into(),
    }
}

pub fn checkout_order_confirmation(style: Style, order_number: &str, total: f64) -> String {
    match style {
        Style::Cuencano => format!(
            "Ayayay qué bien, su pedido {order_number} quedó listo por ${total:.2}. ¡Gracias por su compra!"
        ),
        Style::Juvenil => format!("Listo! Tu pedido {order_number} quedó por ${total:.2} 🎉"),
        Style::Formal => format!(
            "Su pedido ha sido confirmado con el número {order_number} por un total de ${total:.2}. Gracias por su compra."
        ),
        Style::Neutral => format!("Tu pedido {order_number} quedó confirmado por ${total:.2}. ¡Gracias!"),
    }
}

pub fn checkout_insufficient_stock(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay, se nos acabó el stock justo ahora. ¿Vemos otra opción?".into(),
        Style::Juvenil => "Se acabó el stock justo ahorita, ¿vemos otra opción?".into(),
        Style::Formal => "Lamentablemente el stock se agotó. ¿Desearía ver otra opción?".into(),
        Style::Neutral => "El stock se agotó justo ahora. ¿Vemos otra opción?".into(),
    }
}

pub fn checkout_retry(style: Style) -> String {
    match style {
        Style::Cuencano => "Ayayay, algo falló al hacer el pedido. ¿Intentamos de nuevo?".into(),
        Style::Juvenil => "Algo falló con el pedido, ¿intentamos de nuevo?".into(),
        Style::Formal => "No fue posible completar el pedido. ¿Desearía intentarlo nuevamente?".into(),
        Style::Neutral => "No se pudo completar el pedido. ¿Intentamos de nuevo?".into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fixed yes/no tokenization, shared across the whole engine.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const AFFIRMATIVE_TOKENS: &[&str] = &["si", "sí", "ok", "okay", "dale", "claro", "de una", "listo", "sip"];
const NEGATIVE_TOKENS: &[&str] = &["no", "otra", "diferente", "nop", "mejor no", "otro"];

pub fn is_affirmative(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    AFFIRMATIVE_TOKENS.iter().any(|t| normalized == *t || normalized.starts_with(&format!("{t} ")))
}

pub fn is_negative(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    NEGATIVE_TOKENS.iter().any(|t| normalized == *t || normalized.starts_with(&format!("{t} ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_and_negative_tokens_are_disjoint() {
        assert!(is_affirmative("si, claro"));
        assert!(is_negative("no gracias"));
        assert!(!is_affirmative("no gracias"));
        assert!(!is_negative("dale pues"));
    }

    #[test]
    fn unknown_answer_is_neither() {
        assert!(!is_affirmative("tal vez"));
        assert!(!is_negative("tal vez"));
    }

    #[test]
    fn every_style_has_a_stop_farewell() {
        for style in [Style::Cuencano, Style::Juvenil, Style::Formal, Style::Neutral] {
            assert!(!stop_farewell(style).is_empty());
        }
    }
}
